use crate::error::{Result, SheetGuardError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 시트의 최대 행 수 (1,048,576)
pub const MAX_SHEET_ROWS: u32 = 1_048_576;
/// 시트의 최대 열 수 (XFD = 16,384)
pub const MAX_SHEET_COLUMNS: u32 = 16_384;

static CELL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Z]{1,3})(\d{1,7})$").unwrap());
static COLUMN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{1,3}$").unwrap());
static ROW_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,7}$").unwrap());

/// 범위 참조 형태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeShape {
    /// `B3`, `A1:B10`
    Cells,
    /// `A:C` (열 전체)
    Columns,
    /// `2:5` (행 전체)
    Rows,
}

/// 파싱된 사각형 범위 (1부터 시작, 양 끝 포함)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRange {
    pub start_row: u32,
    pub start_col: u32,
    pub end_row: u32,
    pub end_col: u32,
    pub shape: RangeShape,
}

impl CellRange {
    /// 범위 문자열 파싱
    ///
    /// # Examples
    /// ```
    /// use sheetguard::safety::range::CellRange;
    ///
    /// let range = CellRange::parse("A1:B10").unwrap();
    /// assert_eq!((range.start_row, range.end_row), (1, 10));
    /// assert_eq!((range.start_col, range.end_col), (1, 2));
    /// assert_eq!(range.cell_count(), 20);
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let normalized = input.trim().to_uppercase().replace('$', "");
        if normalized.is_empty() {
            return Err(invalid(input, "range is empty"));
        }

        let parts: Vec<&str> = normalized.split(':').collect();
        match parts.as_slice() {
            [single] => {
                let (row, col) = parse_cell(single).ok_or_else(|| {
                    invalid(input, "expected a cell like 'B3' or a range like 'A1:B10'")
                })?;
                Ok(Self::cells(row, col, row, col))
            }
            [start, end] => Self::parse_pair(input, start, end),
            _ => Err(invalid(input, "too many ':' separators")),
        }
    }

    fn parse_pair(input: &str, start: &str, end: &str) -> Result<Self> {
        if let (Some((r1, c1)), Some((r2, c2))) = (parse_cell(start), parse_cell(end)) {
            return Ok(Self::cells(r1, c1, r2, c2));
        }

        if COLUMN_REGEX.is_match(start) && COLUMN_REGEX.is_match(end) {
            let c1 = column_index(start).ok_or_else(|| invalid(input, "column out of bounds"))?;
            let c2 = column_index(end).ok_or_else(|| invalid(input, "column out of bounds"))?;
            return Ok(Self {
                start_row: 1,
                start_col: c1.min(c2),
                end_row: MAX_SHEET_ROWS,
                end_col: c1.max(c2),
                shape: RangeShape::Columns,
            });
        }

        if ROW_REGEX.is_match(start) && ROW_REGEX.is_match(end) {
            let r1 = parse_row(start).ok_or_else(|| invalid(input, "row out of bounds"))?;
            let r2 = parse_row(end).ok_or_else(|| invalid(input, "row out of bounds"))?;
            return Ok(Self {
                start_row: r1.min(r2),
                start_col: 1,
                end_row: r1.max(r2),
                end_col: MAX_SHEET_COLUMNS,
                shape: RangeShape::Rows,
            });
        }

        Err(invalid(
            input,
            "expected 'A1:B10', 'A:C' or '2:5' (both ends of the same kind)",
        ))
    }

    fn cells(r1: u32, c1: u32, r2: u32, c2: u32) -> Self {
        Self {
            start_row: r1.min(r2),
            start_col: c1.min(c2),
            end_row: r1.max(r2),
            end_col: c1.max(c2),
            shape: RangeShape::Cells,
        }
    }

    pub fn row_count(&self) -> u64 {
        u64::from(self.end_row - self.start_row) + 1
    }

    pub fn column_count(&self) -> u64 {
        u64::from(self.end_col - self.start_col) + 1
    }

    pub fn cell_count(&self) -> u64 {
        self.row_count() * self.column_count()
    }

    /// 데이터 범위를 고려한 행 수 (열 전체 참조는 실제 데이터 행 수로 제한)
    pub fn effective_row_count(&self, sheet_rows: usize) -> u64 {
        match self.shape {
            RangeShape::Columns => sheet_rows as u64,
            _ => self.row_count(),
        }
    }

    /// 데이터 범위를 고려한 열 수 (행 전체 참조는 실제 열 수로 제한)
    pub fn effective_column_count(&self, sheet_columns: usize) -> u64 {
        match self.shape {
            RangeShape::Rows => sheet_columns as u64,
            _ => self.column_count(),
        }
    }

    /// 시트 전체를 덮는 범위인지 (모든 행 + 모든 열)
    pub fn is_full_sheet(&self) -> bool {
        self.start_row == 1
            && self.start_col == 1
            && self.end_row == MAX_SHEET_ROWS
            && self.end_col == MAX_SHEET_COLUMNS
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shape {
            RangeShape::Cells if self.start_row == self.end_row && self.start_col == self.end_col => {
                write!(f, "{}{}", column_letters(self.start_col), self.start_row)
            }
            RangeShape::Cells => write!(
                f,
                "{}{}:{}{}",
                column_letters(self.start_col),
                self.start_row,
                column_letters(self.end_col),
                self.end_row
            ),
            RangeShape::Columns => write!(
                f,
                "{}:{}",
                column_letters(self.start_col),
                column_letters(self.end_col)
            ),
            RangeShape::Rows => write!(f, "{}:{}", self.start_row, self.end_row),
        }
    }
}

fn invalid(input: &str, detail: &str) -> SheetGuardError {
    SheetGuardError::Validation(format!("Invalid range '{}': {}", input, detail))
}

/// "B3" -> (row 3, col 2)
fn parse_cell(cell: &str) -> Option<(u32, u32)> {
    let caps = CELL_REGEX.captures(cell)?;
    let col = column_index(caps.get(1)?.as_str())?;
    let row = parse_row(caps.get(2)?.as_str())?;
    Some((row, col))
}

fn parse_row(digits: &str) -> Option<u32> {
    digits
        .parse::<u32>()
        .ok()
        .filter(|row| (1..=MAX_SHEET_ROWS).contains(row))
}

/// 열 문자 -> 1부터 시작하는 인덱스 (A=1, Z=26, AA=27)
pub fn column_index(letters: &str) -> Option<u32> {
    let index = letters.chars().try_fold(0u32, |acc, c| {
        if c.is_ascii_uppercase() {
            Some(acc * 26 + (c as u32 - 'A' as u32 + 1))
        } else {
            None
        }
    })?;
    (1..=MAX_SHEET_COLUMNS).contains(&index).then_some(index)
}

/// 1부터 시작하는 인덱스 -> 열 문자 (1 -> A, 27 -> AA)
pub fn column_letters(mut index: u32) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        index = (index - 1) / 26;
    }
    letters.iter().rev().collect()
}
