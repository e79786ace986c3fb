// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Formatting attributes accepted from callers.
//
// Attribute names are matched exactly; values are matched case-insensitively
// after trimming, because browser clients are not consistent about either.

use thiserror::Error;

/// Rejection of a caller-supplied attribute.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttributeError {
    #[error("unsupported attribute \"{0}\"")]
    Unsupported(String),

    #[error("invalid value \"{value}\" for attribute \"{attribute}\"")]
    InvalidValue { attribute: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSize {
    Normal,
    /// Emphasised at normal magnification.
    Bold,
    /// Double height.
    Tall,
    /// Double width.
    Wide,
    /// Double width and height.
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    A,
    B,
}

/// A validated formatting attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAttribute {
    Align(Alignment),
    TextSize(TextSize),
    Font(Font),
}

impl TextAttribute {
    /// Validate an attribute name and value pair.
    pub fn parse(name: &str, value: &str) -> Result<Self, AttributeError> {
        let normalized = value.trim().to_ascii_lowercase();
        let invalid = || AttributeError::InvalidValue {
            attribute: name.to_string(),
            value: value.to_string(),
        };

        match name {
            "align" => {
                let alignment = match normalized.as_str() {
                    "left" => Alignment::Left,
                    "center" | "centre" => Alignment::Center,
                    "right" => Alignment::Right,
                    _ => return Err(invalid()),
                };
                Ok(Self::Align(alignment))
            }
            "text_size" | "text_type" => {
                let size = match normalized.as_str() {
                    "normal" => TextSize::Normal,
                    "b" | "bold" => TextSize::Bold,
                    "tall" | "2h" => TextSize::Tall,
                    "wide" | "2w" => TextSize::Wide,
                    "double" | "big" | "2x" => TextSize::Double,
                    _ => return Err(invalid()),
                };
                Ok(Self::TextSize(size))
            }
            "font" => {
                let font = match normalized.as_str() {
                    "a" => Font::A,
                    "b" => Font::B,
                    _ => return Err(invalid()),
                };
                Ok(Self::Font(font))
            }
            other => Err(AttributeError::Unsupported(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Align(_) => "align",
            Self::TextSize(_) => "text_size",
            Self::Font(_) => "font",
        }
    }
}
