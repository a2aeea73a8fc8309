use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::constants::{MAX_ENCODED_NAME_LEN, MAX_FILE_NAME_LEN};
use crate::error::FileNameError;

/// A user-facing file name, validated and paired with its on-disk encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileName {
    raw: String,
    enc: String,
}

impl FileName {
    pub fn parse(s: &str) -> Result<Self, FileNameError> {
        if s.is_empty() || s.len() > MAX_FILE_NAME_LEN {
            return Err(FileNameError::Length);
        }
        if s.chars().any(|c| c.is_control() || c == '/' || c == '\\') {
            return Err(FileNameError::Forbidden);
        }
        if s == "." || s == ".." {
            return Err(FileNameError::Forbidden);
        }

        let enc = utf8_percent_encode(s, NON_ALPHANUMERIC).to_string();
        // the encoded form is a single path component on the keeper
        if enc.len() > MAX_ENCODED_NAME_LEN {
            return Err(FileNameError::Length);
        }

        Ok(FileName {
            raw: s.to_string(),
            enc,
        })
    }

    /// Recover a name from its encoded form, as found in a keeper's store.
    pub fn from_encoded(enc: &str) -> Result<Self, FileNameError> {
        let decoded = percent_decode_str(enc)
            .decode_utf8()
            .map_err(|_| FileNameError::Forbidden)?;
        Self::parse(&decoded)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn enc(&self) -> &str {
        &self.enc
    }
}

impl std::fmt::Display for FileName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_non_alphanumerics() {
        let name = FileName::parse("video.mp4").unwrap();
        assert_eq!(name.as_str(), "video.mp4");
        assert_eq!(name.enc(), "video%2Emp4");
    }

    #[test]
    fn rejects_bad_names() {
        assert_eq!(FileName::parse(""), Err(FileNameError::Length));
        assert_eq!(
            FileName::parse(&"a".repeat(MAX_FILE_NAME_LEN + 1)),
            Err(FileNameError::Length)
        );
        assert_eq!(FileName::parse("a/b"), Err(FileNameError::Forbidden));
        assert_eq!(FileName::parse(".."), Err(FileNameError::Forbidden));
        assert_eq!(FileName::parse("a\nb"), Err(FileNameError::Forbidden));
    }

    #[test]
    fn rejects_names_whose_encoding_is_too_long() {
        assert!(FileName::parse(&"a".repeat(MAX_ENCODED_NAME_LEN)).is_ok());
        assert_eq!(
            FileName::parse(&".".repeat(100)),
            Err(FileNameError::Length)
        );
    }

    #[test]
    fn encoded_form_decodes_back() {
        let name = FileName::parse("holiday clip (1).mp4").unwrap();
        let back = FileName::from_encoded(name.enc()).unwrap();
        assert_eq!(back, name);
    }
}
