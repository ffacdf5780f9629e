//! Receipt layout for fixed-width terminal printers.
//!
//! [`ReceiptBuilder`] accumulates formatted lines; nothing is sent until the
//! session flushes the current job. Text longer than the printer width wraps
//! onto continuation lines and is never truncated. Words wider than a line
//! are split.
//!
//! ```
//! use poi_session::printer::ReceiptBuilder;
//!
//! let mut receipt = ReceiptBuilder::new(20);
//! receipt.add_text("Thank you for shopping with us");
//! receipt.add_justified("TOTAL", "12.34");
//!
//! let job = receipt.take_job().unwrap();
//! assert_eq!(job.lines(), ["Thank you for", "shopping with us", "TOTAL          12.34"]);
//! assert!(receipt.take_job().is_none());
//! ```

use std::fmt;

use poi_core::constants::{
    AMOUNT_SEPARATOR_CHAR, DEFAULT_FORWARD_LINES, SEPARATOR_CHAR, STATUS_OK,
};
use poi_core::{Amount, ErrorCode, PoiError, ReceiptData, Result};
use poi_protocol::{DeviceMessage, MessageId};
use serde::{Deserialize, Serialize};

/// Map a print or barcode reply status to an error.
///
/// ```
/// use poi_core::ErrorCode;
/// use poi_session::printer::print_status_error;
///
/// assert!(print_status_error("0").is_none());
/// assert_eq!(print_status_error("1").unwrap().code(), ErrorCode::OutOfPaper);
/// assert_eq!(print_status_error("x").unwrap().code(), ErrorCode::PrintRequest);
/// ```
pub fn print_status_error(status: &str) -> Option<PoiError> {
    let code = match status {
        STATUS_OK => return None,
        "1" => ErrorCode::OutOfPaper,
        "2" => ErrorCode::Printer,
        "3" => ErrorCode::NoPrinterFound,
        "4" => ErrorCode::PrintLimitExceeded,
        _ => ErrorCode::PrintRequest,
    };
    Some(PoiError::with_description(code, format!("print status {status}")))
}

/// Replace control characters so text can never break message framing.
fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() && c != '\n' { ' ' } else { c })
        .collect()
}

fn width_of(text: &str) -> usize {
    text.chars().count()
}

/// Greedy word wrap. Blank input yields one empty line.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for paragraph in sanitize(text).split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();

            if !current.is_empty() {
                if width_of(&current) + 1 + word.len() <= width {
                    current.push(' ');
                    current.extend(word.iter());
                    continue;
                }
                lines.push(std::mem::take(&mut current));
            }

            while word.len() > width {
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            current.extend(word.iter());
        }
        lines.push(current);
    }

    lines
}

fn center(text: &str, width: usize) -> String {
    let len = width_of(text);
    if len >= width {
        return text.to_string();
    }
    format!("{}{}", " ".repeat((width - len) / 2), text)
}

fn pad(text: &str, width: usize) -> String {
    let len = width_of(text);
    format!("{}{}", text, " ".repeat(width.saturating_sub(len)))
}

/// One cell of a column layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub text: String,
    /// Share of the printer width, in percent.
    pub percent: u8,
}

impl Column {
    pub fn new(text: impl Into<String>, percent: u8) -> Self {
        Self {
            text: text.into(),
            percent,
        }
    }
}

/// Lay out columns side by side.
///
/// Every column but the last gets `floor(percent * width / 100)` characters;
/// the last takes the remainder. Each column but the last keeps its final
/// character as a blank gutter, so a full cell never touches its
/// neighbour. Cells wrap inside their column, so the result has as many
/// lines as the tallest cell.
///
/// # Errors
///
/// `PrintRequest` when the list is empty, a share is zero, the shares
/// exceed 100 percent, or a column leaves no room for text.
pub fn layout_columns(columns: &[Column], width: usize) -> Result<Vec<String>> {
    let invalid = |detail: &str| PoiError::with_description(ErrorCode::PrintRequest, detail);

    if columns.is_empty() {
        return Err(invalid("no columns"));
    }
    if columns.iter().any(|c| c.percent == 0) {
        return Err(invalid("column width must be positive"));
    }
    let total: u32 = columns.iter().map(|c| u32::from(c.percent)).sum();
    if total > 100 {
        return Err(invalid("column widths exceed 100 percent"));
    }

    let mut widths: Vec<usize> = columns[..columns.len() - 1]
        .iter()
        .map(|c| usize::from(c.percent) * width / 100)
        .collect();
    let used: usize = widths.iter().sum();
    widths.push(width.saturating_sub(used));
    let last = widths.len() - 1;
    let text_widths: Vec<usize> = widths
        .iter()
        .enumerate()
        .map(|(i, w)| if i == last { *w } else { w.saturating_sub(1) })
        .collect();
    if text_widths.contains(&0) {
        return Err(invalid("column narrower than one character"));
    }

    let cells: Vec<Vec<String>> = columns
        .iter()
        .zip(&text_widths)
        .map(|(column, w)| wrap(&column.text, *w))
        .collect();
    let rows = cells.iter().map(Vec::len).max().unwrap_or(0);

    Ok((0..rows)
        .map(|row| {
            let line: String = cells
                .iter()
                .zip(&widths)
                .map(|(cell, w)| pad(cell.get(row).map_or("", String::as_str), *w))
                .collect();
            line.trim_end().to_string()
        })
        .collect())
}

/// A flushed receipt, immutable once taken from the builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintJob {
    lines: Vec<String>,
}

impl PrintJob {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn to_message(&self) -> DeviceMessage {
        DeviceMessage::new(MessageId::Print).with_fields(self.lines.iter().cloned())
    }
}

/// Line-oriented receipt builder.
#[derive(Debug, Clone)]
pub struct ReceiptBuilder {
    width: usize,
    lines: Vec<String>,
}

impl ReceiptBuilder {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
            lines: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Discard pending content.
    pub fn start_new_receipt(&mut self) {
        self.lines.clear();
    }

    pub fn add_text(&mut self, text: &str) {
        self.lines.extend(wrap(text, self.width));
    }

    pub fn add_new_line(&mut self) {
        self.lines.push(String::new());
    }

    pub fn add_separator_line(&mut self) {
        self.lines
            .push(SEPARATOR_CHAR.to_string().repeat(self.width));
    }

    pub fn add_amount_separator_line(&mut self) {
        self.lines
            .push(AMOUNT_SEPARATOR_CHAR.to_string().repeat(self.width));
    }

    /// Blank line followed by an `X____` signature line.
    pub fn add_signature_line(&mut self) {
        self.add_new_line();
        self.lines
            .push(format!("X{}", "_".repeat(self.width.saturating_sub(1))));
    }

    pub fn add_centered(&mut self, text: &str) {
        let width = self.width;
        self.lines
            .extend(wrap(text, width).iter().map(|line| center(line, width)));
    }

    /// `left` flush left and `right` flush right on one line. When both do
    /// not fit, `left` wraps and `right` gets its own right-aligned line.
    pub fn add_justified(&mut self, left: &str, right: &str) {
        let left = sanitize(left);
        let right = sanitize(right);
        let (left_len, right_len) = (width_of(&left), width_of(&right));

        if left_len + right_len < self.width {
            let gap = self.width - left_len - right_len;
            self.lines.push(format!("{}{}{}", left, " ".repeat(gap), right));
            return;
        }

        self.add_text(&left);
        for line in wrap(&right, self.width) {
            let len = width_of(&line);
            self.lines
                .push(format!("{}{}", " ".repeat(self.width - len), line));
        }
    }

    pub fn add_lines<S: AsRef<str>>(&mut self, lines: &[S], centered: bool) {
        for line in lines {
            if centered {
                self.add_centered(line.as_ref());
            } else {
                self.add_text(line.as_ref());
            }
        }
    }

    pub fn add_columns(&mut self, columns: &[Column]) -> Result<()> {
        let rows = layout_columns(columns, self.width)?;
        self.lines.extend(rows);
        Ok(())
    }

    /// Three columns at 40/30/30 percent.
    pub fn add_three_columns(&mut self, first: &str, second: &str, third: &str) -> Result<()> {
        self.add_columns(&[
            Column::new(first, 40),
            Column::new(second, 30),
            Column::new(third, 30),
        ])
    }

    /// Feed `lines` blank lines, or the default paper advance.
    pub fn forward(&mut self, lines: Option<usize>) {
        for _ in 0..lines.unwrap_or(DEFAULT_FORWARD_LINES) {
            self.add_new_line();
        }
    }

    fn add_field(&mut self, label: &str, value: Option<&str>) {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.add_justified(label, value);
        }
    }

    fn add_amount(&mut self, label: &str, amount: Option<Amount>) {
        if let Some(amount) = amount {
            self.add_justified(label, &amount.to_string());
        }
    }

    /// Render transaction receipt data. Absent fields are skipped.
    pub fn add_receipt_data(&mut self, data: &ReceiptData) {
        self.add_lines(&data.header_lines, true);
        if !data.header_lines.is_empty() {
            self.add_new_line();
        }

        self.add_field("MERCHANT ID:", data.merchant_id.as_deref());
        self.add_field("TERMINAL ID:", data.terminal_id.as_deref());
        if let Some(date_time) = data.date_time {
            self.add_justified(
                &date_time.format("%Y-%m-%d").to_string(),
                &date_time.format("%H:%M:%S").to_string(),
            );
        }
        if let Some(kind) = data.transaction_type.as_deref() {
            self.add_new_line();
            self.add_centered(kind);
        }
        self.add_new_line();

        self.add_field("CARD TYPE:", data.card_type.as_deref());
        self.add_field("ACCOUNT:", data.account_number.as_deref());
        self.add_field("ENTRY:", data.entry_type.as_deref());
        self.add_field("TRANSACTION ID:", data.transaction_id.as_deref());
        self.add_field("REFERENCE:", data.reference_number.as_deref());
        self.add_field("APPROVAL CODE:", data.approval_code.as_deref());
        self.add_field("RESPONSE CODE:", data.response_code.as_deref());

        self.add_separator_line();
        self.add_amount("AMOUNT", data.transaction_amount);
        self.add_amount("CASHBACK", data.cashback_amount);
        self.add_amount("TIP", data.tip_amount);
        if data.approved_amount.is_some() {
            self.add_amount_separator_line();
            self.add_amount("TOTAL", data.approved_amount);
        }

        if let Some(status) = data.transaction_status.as_deref() {
            self.add_new_line();
            self.add_centered(status);
        }

        if let Some(emv) = &data.emv_data {
            self.add_new_line();
            self.add_field("AID:", Some(&emv.application_identifier));
            self.add_field("APP:", Some(&emv.application_label));
            self.add_field("TVR:", Some(&emv.terminal_verification_results));
            self.add_field("TSI:", Some(&emv.transaction_status_information));
            self.add_field("AC:", Some(&emv.cryptogram));
        }

        if data.pin_verified {
            self.add_centered("PIN VERIFIED");
        }
        if data.signature_required {
            if let Some(agreement) = data.signature_agreement_text.as_deref() {
                self.add_new_line();
                self.add_text(agreement);
            }
            self.add_signature_line();
        }

        if let Some(copy) = data.type_of_copy.as_deref() {
            self.add_new_line();
            self.add_centered(copy);
        }
        if !data.footer_lines.is_empty() {
            self.add_new_line();
            self.add_lines(&data.footer_lines, true);
        }
    }

    /// Take the pending content as a job and reset the builder. Returns
    /// `None` when nothing was added since the last flush.
    pub fn take_job(&mut self) -> Option<PrintJob> {
        if self.lines.is_empty() {
            return None;
        }
        Some(PrintJob {
            lines: std::mem::take(&mut self.lines),
        })
    }
}

/// Barcode symbology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarcodeType {
    Code39,
    Code128,
    UpcA,
    Qr,
}

impl BarcodeType {
    fn code(self) -> &'static str {
        match self {
            Self::Code39 => "39",
            Self::Code128 => "128",
            Self::UpcA => "UPCA",
            Self::Qr => "QR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarcodeAlignment {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarcodeOrientation {
    #[default]
    Horizontal,
    Vertical,
}

/// An immediate barcode print.
///
/// ```
/// use poi_session::printer::{BarcodeRequest, BarcodeType};
///
/// let request = BarcodeRequest::new(BarcodeType::Code128, "INV-1001");
/// assert!(request.validate().is_ok());
/// assert!(BarcodeRequest::new(BarcodeType::Qr, "").validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarcodeRequest {
    pub barcode_type: BarcodeType,
    pub data: String,
    /// Bar height in printer dots
    pub height: u16,
    /// Narrow bar width in printer dots
    pub width: u16,
    pub alignment: BarcodeAlignment,
    pub orientation: BarcodeOrientation,
}

impl BarcodeRequest {
    pub fn new(barcode_type: BarcodeType, data: impl Into<String>) -> Self {
        Self {
            barcode_type,
            data: data.into(),
            height: 80,
            width: 2,
            alignment: BarcodeAlignment::default(),
            orientation: BarcodeOrientation::default(),
        }
    }

    pub fn with_size(mut self, height: u16, width: u16) -> Self {
        self.height = height;
        self.width = width;
        self
    }

    pub fn with_alignment(mut self, alignment: BarcodeAlignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_orientation(mut self, orientation: BarcodeOrientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.data.trim().is_empty() {
            return Err(PoiError::parameter_is_nil("data"));
        }
        if self.height == 0 || self.width == 0 {
            return Err(PoiError::with_description(
                ErrorCode::BarcodeInvalidConfigurationValue,
                "barcode height and width must be positive",
            ));
        }
        Ok(())
    }

    pub fn to_message(&self) -> DeviceMessage {
        let alignment = match self.alignment {
            BarcodeAlignment::Left => "L",
            BarcodeAlignment::Center => "C",
            BarcodeAlignment::Right => "R",
        };
        let orientation = match self.orientation {
            BarcodeOrientation::Horizontal => "H",
            BarcodeOrientation::Vertical => "V",
        };
        DeviceMessage::new(MessageId::PrintBarcode).with_fields([
            self.barcode_type.code().to_string(),
            self.height.to_string(),
            self.width.to_string(),
            alignment.to_string(),
            orientation.to_string(),
            sanitize(&self.data),
        ])
    }
}

impl fmt::Display for PrintJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}
