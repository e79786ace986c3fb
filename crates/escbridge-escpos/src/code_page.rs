// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Character code pages a receipt printer can be switched to.

use escpos::utils::PageCode;
use serde::{Deserialize, Serialize};

/// Single-byte code page used for printed text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodePage {
    /// US / standard Europe. Power-on default of most thermal printers.
    #[default]
    #[serde(alias = "pc437")]
    Cp437,
    #[serde(alias = "pc850")]
    Cp850,
    #[serde(alias = "pc852")]
    Cp852,
    /// CP850 with the euro sign.
    #[serde(alias = "pc858")]
    Cp858,
    #[serde(alias = "pc866")]
    Cp866,
    #[serde(alias = "wpc1252", alias = "windows-1252")]
    Cp1252,
}

impl CodePage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cp437 => "cp437",
            Self::Cp850 => "cp850",
            Self::Cp852 => "cp852",
            Self::Cp858 => "cp858",
            Self::Cp866 => "cp866",
            Self::Cp1252 => "cp1252",
        }
    }
}

impl From<CodePage> for PageCode {
    fn from(page: CodePage) -> Self {
        match page {
            CodePage::Cp437 => PageCode::PC437,
            CodePage::Cp850 => PageCode::PC850,
            CodePage::Cp852 => PageCode::PC852,
            CodePage::Cp858 => PageCode::PC858,
            CodePage::Cp866 => PageCode::PC866,
            CodePage::Cp1252 => PageCode::WPC1252,
        }
    }
}

impl std::fmt::Display for CodePage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
