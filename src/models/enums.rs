use serde::{Deserialize, Serialize};

use super::ModelError;

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The string form is also the serde representation.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ModelError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Difficulty {
    Easy => "easy",
    Medium => "medium",
    Hard => "hard",
});

str_enum!(QuestionType {
    Code => "code",
    Choice => "choice",
    Fill => "fill",
});

impl Default for Difficulty {
    fn default() -> Self {
        Self::Medium
    }
}

impl Default for QuestionType {
    fn default() -> Self {
        Self::Code
    }
}

/// Easy < Medium < Hard.
impl PartialOrd for Difficulty {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Difficulty {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl Difficulty {
    fn rank(&self) -> u8 {
        match self {
            Self::Easy => 0,
            Self::Medium => 1,
            Self::Hard => 2,
        }
    }

    pub fn all() -> &'static [Difficulty] {
        &[Self::Easy, Self::Medium, Self::Hard]
    }

    /// Lenient mapping from free-form labels ("Easy", "简单", "中等难度", "★★★").
    ///
    /// Medium is checked first: "中等难度" contains the hard keyword "难".
    pub fn from_label(label: &str) -> Option<Self> {
        let lower = label.trim().to_lowercase();
        if lower.is_empty() {
            return None;
        }
        const MEDIUM: &[&str] = &["medium", "moderate", "normal", "中等", "中级", "一般", "普通"];
        const EASY: &[&str] = &["easy", "simple", "beginner", "简单", "入门", "初级", "容易", "基础"];
        const HARD: &[&str] = &["hard", "difficult", "advanced", "困难", "较难", "高级", "难"];

        if MEDIUM.iter().any(|k| lower.contains(k)) {
            Some(Self::Medium)
        } else if EASY.iter().any(|k| lower.contains(k)) {
            Some(Self::Easy)
        } else if HARD.iter().any(|k| lower.contains(k)) {
            Some(Self::Hard)
        } else {
            match lower.chars().filter(|c| *c == '★').count() {
                1 => Some(Self::Easy),
                2 => Some(Self::Medium),
                n if n >= 3 => Some(Self::Hard),
                _ => None,
            }
        }
    }
}

impl QuestionType {
    /// Lenient mapping used for untrusted service payloads and front matter.
    pub fn from_label(label: &str) -> Self {
        let lower = label.trim().to_lowercase();
        if lower.contains("choice") || lower.contains("选择") {
            Self::Choice
        } else if lower.contains("fill") || lower.contains("填空") {
            Self::Fill
        } else {
            Self::Code
        }
    }
}
