//! Save file and element patch decoding errors.

/// A save file, element patch or service payload that does not decode.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("JSON Error: {} at {} (line {} in {})", message, location.as_deref().unwrap_or("document root"), line, file)]
pub struct JsonError {
    /// What is wrong with the payload
    pub message: String,
    /// Where in the payload: a field name, or `line:column` in the text
    pub location: Option<String>,
    /// Line number where the error was detected
    pub line: u32,
    /// File where the error was detected
    pub file: &'static str,
}

impl JsonError {
    /// Create a new JsonError at the current location.
    ///
    /// # Examples
    ///
    /// ```
    /// use libretto_error::JsonError;
    ///
    /// let err = JsonError::new("volume must be a number").at("volume");
    /// assert_eq!(err.location.as_deref(), Some("volume"));
    /// assert!(err.to_string().contains("at volume"));
    /// ```
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        Self {
            message: message.into(),
            location: None,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Point at the offending field or text position.
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

#[cfg(feature = "json")]
impl From<serde_json::Error> for JsonError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        let error = Self::new(err.to_string());
        // serde_json reports line 0 for errors not tied to the input text
        if err.line() > 0 {
            error.at(format!("{}:{}", err.line(), err.column()))
        } else {
            error
        }
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;

    #[test]
    fn syntax_errors_point_into_the_text() {
        let err = serde_json::from_str::<serde_json::Value>("{\n  \"name\": }")
            .map_err(JsonError::from)
            .unwrap_err();
        assert!(err.location.as_deref().is_some_and(|at| at.starts_with("2:")));
    }
}
