use serde::Serialize;
use std::io::{self, Write};

use super::{PredictError, Prediction};

/// 標準出力に書く1行分のJSON
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredictionOutput {
    Success(Prediction),
    Failure { error: String },
}

impl PredictionOutput {
    pub fn error(reason: impl Into<String>) -> Self {
        PredictionOutput::Failure { error: reason.into() }
    }

    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| INTERNAL_ERROR_LINE.to_string())
    }
}

impl From<Result<Prediction, PredictError>> for PredictionOutput {
    fn from(result: Result<Prediction, PredictError>) -> Self {
        match result {
            Ok(prediction) => PredictionOutput::Success(prediction),
            Err(e) => PredictionOutput::error(e.reason()),
        }
    }
}

const INTERNAL_ERROR_LINE: &str = r#"{"error":"internal_error"}"#;

/// 結果行を必ず1回だけ書き出すガード
///
/// `emit` されないまま破棄された場合（途中のpanicなど）は
/// `{"error":"internal_error"}` を書き出す。
pub struct OutputGuard<W: Write> {
    writer: W,
    emitted: bool,
}

impl<W: Write> OutputGuard<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, emitted: false }
    }

    /// 結果を1行で書き出してフラッシュする
    pub fn emit(mut self, output: &PredictionOutput) -> io::Result<()> {
        self.emitted = true;
        write_line(&mut self.writer, &output.to_json_line())
    }
}

impl<W: Write> Drop for OutputGuard<W> {
    fn drop(&mut self) {
        if !self.emitted {
            self.emitted = true;
            let _ = write_line(&mut self.writer, INTERNAL_ERROR_LINE);
        }
    }
}

fn write_line<W: Write>(writer: &mut W, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_success_line() {
        let mut buf = Vec::new();
        let output = PredictionOutput::from(Ok(Prediction {
            index: 2,
            soil_type: "Sandy soil".into(),
            confidence: 0.25,
        }));
        OutputGuard::new(&mut buf).emit(&output).unwrap();

        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "{\"soilType\":\"Sandy soil\",\"confidence\":0.25}\n"
        );
    }

    #[test]
    fn test_emit_error_line() {
        let mut buf = Vec::new();
        let output = PredictionOutput::from(Err(PredictError::NoImagePath));
        OutputGuard::new(&mut buf).emit(&output).unwrap();

        assert_eq!(String::from_utf8(buf).unwrap(), "{\"error\":\"no_image_path\"}\n");
    }

    #[test]
    fn test_dropped_guard_writes_fallback_once() {
        let mut buf = Vec::new();
        {
            let _guard = OutputGuard::new(&mut buf);
        }
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(value["error"], "internal_error");
    }

    #[test]
    fn test_guard_survives_panic() {
        let mut buf = Vec::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = OutputGuard::new(&mut buf);
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(String::from_utf8(buf).unwrap(), format!("{}\n", INTERNAL_ERROR_LINE));
    }
}
