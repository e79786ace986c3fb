// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Byte encoding through the `escpos` crate.
//
// `escpos::printer::Printer` normally owns a live device driver. Here it is
// pointed at an in-memory capture driver, so every call yields the exact
// bytes the library would have sent and the bridge's own transports deliver
// them.

use std::cell::RefCell;
use std::rc::Rc;

use escpos::driver::Driver;
use escpos::errors::PrinterError;
use escpos::printer::Printer;
use escpos::printer_options::PrinterOptions;
use escpos::utils::{Font as EscposFont, JustifyMode, PageCode, Protocol};
use thiserror::Error;

use crate::attribute::{Alignment, Font, TextAttribute, TextSize};
use crate::code_page::CodePage;

/// Lines fed before cutting so the last printed line clears the blade.
pub const CUT_FEED_LINES: u8 = 3;

/// Columns assumed for an 80 mm roll in Font A.
const CHARACTERS_PER_LINE: u8 = 42;

/// The command library could not encode a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot encode {what}: {cause}")]
pub struct EncodeError {
    pub what: &'static str,
    pub cause: String,
}

/// Collects whatever the printer would have written.
#[derive(Clone, Default)]
struct Capture(Rc<RefCell<Vec<u8>>>);

impl Capture {
    fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

impl Driver for Capture {
    fn name(&self) -> String {
        "capture".to_string()
    }

    fn write(&self, data: &[u8]) -> Result<(), PrinterError> {
        self.0.borrow_mut().extend_from_slice(data);
        Ok(())
    }

    fn read(&self, _buf: &mut [u8]) -> Result<usize, PrinterError> {
        Ok(0)
    }

    fn flush(&self) -> Result<(), PrinterError> {
        Ok(())
    }
}

/// Encodes text, attributes and cuts for one code page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Encoder {
    code_page: CodePage,
}

impl Encoder {
    pub fn new(code_page: CodePage) -> Self {
        Self { code_page }
    }

    pub fn code_page(&self) -> CodePage {
        self.code_page
    }

    fn encode<F>(&self, what: &'static str, build: F) -> Result<Vec<u8>, EncodeError>
    where
        F: FnOnce(&mut Printer<Capture>) -> Result<(), PrinterError>,
    {
        let capture = Capture::default();
        let options = PrinterOptions::new(
            Some(PageCode::from(self.code_page)),
            None,
            CHARACTERS_PER_LINE,
        );
        let mut printer = Printer::new(capture.clone(), Protocol::default(), Some(options));

        build(&mut printer)
            .and_then(|()| printer.print().map(|_| ()))
            .map_err(|e| EncodeError {
                what,
                cause: e.to_string(),
            })?;
        Ok(capture.take())
    }

    /// Select the code page, then the transcoded text. Newlines pass through.
    pub fn text(&self, text: &str) -> Result<Vec<u8>, EncodeError> {
        let page = PageCode::from(self.code_page);
        self.encode("text", |printer| {
            printer.page_code(page)?.write(text)?;
            Ok(())
        })
    }

    /// Commands that put the printer into the attribute's state.
    pub fn attribute(&self, attribute: TextAttribute) -> Result<Vec<u8>, EncodeError> {
        self.encode(attribute.name(), |printer| {
            match attribute {
                TextAttribute::Align(Alignment::Left) => printer.justify(JustifyMode::LEFT)?,
                TextAttribute::Align(Alignment::Center) => printer.justify(JustifyMode::CENTER)?,
                TextAttribute::Align(Alignment::Right) => printer.justify(JustifyMode::RIGHT)?,
                TextAttribute::TextSize(TextSize::Normal) => printer.size(1, 1)?.bold(false)?,
                TextAttribute::TextSize(TextSize::Bold) => printer.bold(true)?,
                TextAttribute::TextSize(TextSize::Tall) => printer.size(1, 2)?,
                TextAttribute::TextSize(TextSize::Wide) => printer.size(2, 1)?,
                TextAttribute::TextSize(TextSize::Double) => printer.size(2, 2)?,
                TextAttribute::Font(Font::A) => printer.font(EscposFont::A)?,
                TextAttribute::Font(Font::B) => printer.font(EscposFont::B)?,
            };
            Ok(())
        })
    }

    /// Feed past the blade, then a partial cut.
    pub fn cut(&self) -> Result<Vec<u8>, EncodeError> {
        self.encode("cut", |printer| {
            printer.feeds(CUT_FEED_LINES)?.partial_cut()?;
            Ok(())
        })
    }

    /// Whether the library produces output at all for this code page.
    pub fn is_available(&self) -> bool {
        self.text("ok").is_ok_and(|bytes| bytes.ends_with(b"ok"))
    }
}
