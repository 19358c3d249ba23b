//! Score line extraction from judge output.

use agon_common::Score;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoreParseError {
    #[error("no line starting with `{0}`")]
    MissingLine(String),

    #[error("score token `{0}` is not an integer")]
    InvalidToken(String),
}

/// Finds the last line starting with a marker and reads its last token as the score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreParser {
    marker: String,
}

impl ScoreParser {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn parse(&self, output: &str) -> Result<Score, ScoreParseError> {
        let line = output
            .lines()
            .rev()
            .find(|line| line.starts_with(&self.marker))
            .ok_or_else(|| ScoreParseError::MissingLine(self.marker.clone()))?;

        let token = line.split_whitespace().last().unwrap_or_default();
        token
            .parse::<Score>()
            .map_err(|_| ScoreParseError::InvalidToken(token.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_last_token() {
        let parser = ScoreParser::new("Score =");
        assert_eq!(parser.parse("turn 1\nScore = 1234\n"), Ok(1234));
    }

    #[test]
    fn test_last_marker_line_wins() {
        let parser = ScoreParser::new("Score");
        let output = "Score 10\nnoise\nScore 20\ntrailing\n";
        assert_eq!(parser.parse(output), Ok(20));
    }

    #[test]
    fn test_prefix_must_start_the_line() {
        let parser = ScoreParser::new("Score");
        assert_eq!(
            parser.parse("  Score 10\nFinal Score 30\n"),
            Err(ScoreParseError::MissingLine("Score".into()))
        );
    }

    #[test]
    fn test_invalid_token() {
        let parser = ScoreParser::new("Score =");
        assert_eq!(
            parser.parse("Score = 12.5\n"),
            Err(ScoreParseError::InvalidToken("12.5".into()))
        );
        assert_eq!(
            parser.parse("Score =\n"),
            Err(ScoreParseError::InvalidToken("=".into()))
        );
    }

    #[test]
    fn test_negative_and_crlf() {
        let parser = ScoreParser::new("Score");
        assert_eq!(parser.parse("Score -3\r\n"), Ok(-3));
        assert_eq!(parser.parse("Score: 77\r\n"), Ok(77));
    }
}
