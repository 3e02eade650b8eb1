//! Shared error type

use thiserror::Error;

/// Errors surfaced by the telsim crates outside the state machines, which
/// report failures through completions and events instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_is_transparent() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "phone.yaml").into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.to_string(), "phone.yaml");
    }

    #[test]
    fn test_yaml_error_is_prefixed() {
        let yaml: std::result::Result<u32, _> = serde_yaml::from_str("[");
        let err: Error = yaml.unwrap_err().into();
        assert!(err.to_string().starts_with("YAML: "));
    }
}
