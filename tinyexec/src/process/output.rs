use serde::{Deserialize, Serialize};

/// Buffered result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    /// Captured stdout text.
    pub stdout: String,

    /// Captured stderr text.
    pub stderr: String,

    /// Exit code; `None` if the process ended by signal or never ran.
    pub exit_code: Option<i32>,
}

impl Output {
    /// Check if the process exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_requires_zero_exit() {
        let mut output = Output::default();
        assert!(!output.success());
        output.exit_code = Some(0);
        assert!(output.success());
        output.exit_code = Some(2);
        assert!(!output.success());
    }

    #[test]
    fn serializes_to_json() {
        let output = Output {
            stdout: "foo\n".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["stdout"], "foo\n");
        assert_eq!(json["exit_code"], 0);
    }
}
