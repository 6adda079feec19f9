//! Supported-language registry for the MOSS service
//!
//! The remote service accepts a fixed set of language identifiers; everything
//! else is rejected before any network I/O. Wire names are the lowercase
//! identifiers the service expects on the `language` command.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A language the similarity service can compare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MossLanguage {
    #[serde(rename = "python")]
    Python,
    #[serde(rename = "java")]
    Java,
    #[serde(rename = "cc")]
    Cpp,
    #[serde(rename = "c")]
    C,
    #[serde(rename = "csharp")]
    CSharp,
    #[serde(rename = "javascript")]
    JavaScript,
    #[serde(rename = "perl")]
    Perl,
    #[serde(rename = "mips")]
    Mips,
}

impl MossLanguage {
    /// All supported languages, in registry order
    pub fn all() -> &'static [MossLanguage] {
        &[
            MossLanguage::Python,
            MossLanguage::Java,
            MossLanguage::Cpp,
            MossLanguage::C,
            MossLanguage::CSharp,
            MossLanguage::JavaScript,
            MossLanguage::Perl,
            MossLanguage::Mips,
        ]
    }

    /// Identifier sent on the wire (`language <wire_name>`)
    pub fn wire_name(&self) -> &'static str {
        match self {
            MossLanguage::Python => "python",
            MossLanguage::Java => "java",
            MossLanguage::Cpp => "cc",
            MossLanguage::C => "c",
            MossLanguage::CSharp => "csharp",
            MossLanguage::JavaScript => "javascript",
            MossLanguage::Perl => "perl",
            MossLanguage::Mips => "mips",
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            MossLanguage::Python => "Python",
            MossLanguage::Java => "Java",
            MossLanguage::Cpp => "C++",
            MossLanguage::C => "C",
            MossLanguage::CSharp => "C#",
            MossLanguage::JavaScript => "Javascript",
            MossLanguage::Perl => "Perl",
            MossLanguage::Mips => "MIPS assembly",
        }
    }

    /// File extensions conventionally associated with this language,
    /// used by callers to pre-filter submission files.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            MossLanguage::Python => &["py"],
            MossLanguage::Java => &["java"],
            MossLanguage::Cpp => &[
                "C", "cc", "cpp", "cxx", "c++", "h", "H", "hh", "hpp", "hxx", "h++",
            ],
            MossLanguage::C => &["c", "h"],
            MossLanguage::CSharp => &["cs", "csx"],
            MossLanguage::JavaScript => &["js"],
            MossLanguage::Perl => &["pl", "plx", "pm", "xs", "t", "pod"],
            MossLanguage::Mips => &["asm", "s"],
        }
    }

    /// Whether `tag` names a supported language
    pub fn is_supported(tag: &str) -> bool {
        MossLanguage::from_str(tag).is_ok()
    }
}

impl fmt::Display for MossLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for MossLanguage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MossLanguage::all()
            .iter()
            .copied()
            .find(|l| l.wire_name() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unsupported language: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_name_round_trip() {
        for lang in MossLanguage::all() {
            let parsed = MossLanguage::from_str(lang.wire_name()).unwrap();
            assert_eq!(parsed, *lang);
        }
    }

    #[test]
    fn test_unknown_language_rejected() {
        assert!(MossLanguage::from_str("brainfuck").is_err());
        assert!(MossLanguage::from_str("Python").is_err()); // wire names are lowercase
        assert!(!MossLanguage::is_supported("fortran"));
    }

    #[test]
    fn test_cpp_uses_cc_on_the_wire() {
        assert_eq!(MossLanguage::Cpp.wire_name(), "cc");
        assert_eq!(MossLanguage::Cpp.display_name(), "C++");
    }

    #[test]
    fn test_extensions_nonempty() {
        for lang in MossLanguage::all() {
            assert!(!lang.extensions().is_empty());
        }
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&MossLanguage::Cpp).unwrap();
        assert_eq!(json, "\"cc\"");
        let parsed: MossLanguage = serde_json::from_str("\"javascript\"").unwrap();
        assert_eq!(parsed, MossLanguage::JavaScript);
    }
}
