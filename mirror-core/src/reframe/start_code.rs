//! Start-code scanning.
//!
//! A start code is a run of at least three zero bytes followed by a
//! single `0x01`. Only the last four bytes of the run are treated as
//! the delimiter; any extra leading zeros stay with the preceding unit.

/// Location of one start code inside a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartCode {
    /// First byte of the 4-byte delimiter (`00 00 00 01`).
    pub start: usize,
    /// One past the `0x01`, i.e. the first byte of the NAL unit.
    pub end: usize,
}

impl StartCode {
    /// Bytes occupied by the delimiter.
    pub const LEN: usize = 4;
}

/// Find the first start code in `data`.
pub fn find_start_code(data: &[u8]) -> Option<StartCode> {
    let mut zeros = 0usize;
    for (i, &byte) in data.iter().enumerate() {
        match byte {
            0x00 => zeros += 1,
            0x01 if zeros >= 3 => {
                return Some(StartCode {
                    start: i + 1 - StartCode::LEN,
                    end: i + 1,
                });
            }
            _ => zeros = 0,
        }
    }
    None
}

/// Iterator over every start code in a buffer, in order.
pub struct StartCodes<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> StartCodes<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl Iterator for StartCodes<'_> {
    type Item = StartCode;

    fn next(&mut self) -> Option<StartCode> {
        let found = find_start_code(&self.data[self.pos..])?;
        let code = StartCode {
            start: self.pos + found.start,
            end: self.pos + found.end,
        };
        self.pos = code.end;
        Some(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_four_byte_code() {
        let data = [0xAA, 0, 0, 0, 1, 0x67];
        assert_eq!(find_start_code(&data), Some(StartCode { start: 1, end: 5 }));
    }

    #[test]
    fn extra_zeros_stay_with_previous_unit() {
        let data = [0, 0, 0, 0, 0, 1, 0x68];
        assert_eq!(find_start_code(&data), Some(StartCode { start: 2, end: 6 }));
    }

    #[test]
    fn three_byte_code_is_not_a_delimiter() {
        assert_eq!(find_start_code(&[0, 0, 1, 0x65]), None);
    }

    #[test]
    fn missing_code_is_none() {
        assert_eq!(find_start_code(&[]), None);
        assert_eq!(find_start_code(&[0, 0, 0]), None);
        assert_eq!(find_start_code(&[1, 2, 3, 4]), None);
    }

    #[test]
    fn interrupted_run_resets() {
        assert_eq!(find_start_code(&[0, 0, 5, 0, 1]), None);
    }

    #[test]
    fn iterates_all_codes() {
        let data = [0, 0, 0, 1, 0x67, 0x42, 0, 0, 0, 1, 0x68, 0, 0, 0, 1, 0x65];
        let codes: Vec<_> = StartCodes::new(&data).collect();
        assert_eq!(
            codes,
            vec![
                StartCode { start: 0, end: 4 },
                StartCode { start: 6, end: 10 },
                StartCode { start: 11, end: 15 },
            ]
        );
    }
}
