// Floor notation: Roman numerals with a ground-floor marker.
// "VPR" / "PR" -> "Ground Floor", "IV/6" -> "4/6", "IV" -> "4/?"

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::InvalidNumeralError;
use crate::model::{GROUND_FLOOR, UNKNOWN_MAX_FLOOR};

static GROUND_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new("PR|VPR").expect("static pattern"));

fn digit_value(ch: char) -> Option<i64> {
    match ch {
        'I' => Some(1),
        'V' => Some(5),
        'X' => Some(10),
        'L' => Some(50),
        'C' => Some(100),
        'D' => Some(500),
        'M' => Some(1000),
        _ => None,
    }
}

/// Convert a Roman numeral to its integer value.
///
/// Walks the digits right to left: a digit at least as large as the one to
/// its right is added, a smaller one is subtracted (`IV` = 4, `XL` = 40).
/// Non-canonical forms are accepted as long as every character is a digit.
pub fn roman_to_arabic(roman: &str) -> Result<i64, InvalidNumeralError> {
    if roman.is_empty() {
        return Err(InvalidNumeralError { input: String::new(), ch: None });
    }

    let mut total = 0i64;
    let mut prev = 0i64;

    for ch in roman.chars().rev() {
        let value = digit_value(ch).ok_or_else(|| InvalidNumeralError {
            input: roman.to_string(),
            ch: Some(ch),
        })?;

        if value >= prev {
            total += value;
        } else {
            total -= value;
        }
        prev = value;
    }

    Ok(total)
}

/// Normalize a raw floor string into `"<floor>/<max floor>"` form.
///
/// Ground-floor markers are a plain text substitution, so any other
/// characters around them survive untouched.
pub fn normalize_floor(raw: &str) -> Result<String, InvalidNumeralError> {
    if raw.contains("PR") {
        return Ok(GROUND_MARKER.replace_all(raw, GROUND_FLOOR).into_owned());
    }

    match raw.split_once('/') {
        None => Ok(format!("{}/{UNKNOWN_MAX_FLOOR}", roman_to_arabic(raw)?)),
        Some((floor, max_floor)) => Ok(format!("{}/{max_floor}", roman_to_arabic(floor)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Canonical subtractive encoding, used as the reference for round trips.
    fn to_roman(mut n: i64) -> String {
        const TABLE: [(i64, &str); 13] = [
            (1000, "M"), (900, "CM"), (500, "D"), (400, "CD"),
            (100, "C"), (90, "XC"), (50, "L"), (40, "XL"),
            (10, "X"), (9, "IX"), (5, "V"), (4, "IV"), (1, "I"),
        ];
        let mut out = String::new();
        for (value, digits) in TABLE {
            while n >= value {
                out.push_str(digits);
                n -= value;
            }
        }
        out
    }

    #[test]
    fn known_values() {
        assert_eq!(roman_to_arabic("IV").unwrap(), 4);
        assert_eq!(roman_to_arabic("IX").unwrap(), 9);
        assert_eq!(roman_to_arabic("XL").unwrap(), 40);
        assert_eq!(roman_to_arabic("MCMXCIV").unwrap(), 1994);
        assert_eq!(roman_to_arabic("XII").unwrap(), 12);
    }

    #[test]
    fn every_canonical_numeral_round_trips() {
        for n in 1..=3999 {
            let roman = to_roman(n);
            assert_eq!(roman_to_arabic(&roman).unwrap(), n, "{roman}");
        }
    }

    #[test]
    fn unmapped_character_is_rejected() {
        let err = roman_to_arabic("SUT").unwrap_err();
        assert_eq!(err.ch, Some('S'));
        assert_eq!(err.input, "SUT");

        let err = roman_to_arabic("iv").unwrap_err();
        assert_eq!(err.ch, Some('v'));

        assert_eq!(roman_to_arabic("").unwrap_err().ch, None);
    }

    #[test]
    fn ground_floor_markers() {
        assert_eq!(normalize_floor("VPR").unwrap(), "Ground Floor");
        assert_eq!(normalize_floor("PR").unwrap(), "Ground Floor");
        assert_eq!(normalize_floor("PR/5").unwrap(), "Ground Floor/5");
        assert_eq!(normalize_floor("VPR/4").unwrap(), "Ground Floor/4");
        // Surrounding text is preserved; only the markers are rewritten.
        assert_eq!(normalize_floor(" PR /PR").unwrap(), " Ground Floor /Ground Floor");
    }

    #[test]
    fn roman_with_and_without_total() {
        assert_eq!(normalize_floor("IV/6").unwrap(), "4/6");
        assert_eq!(normalize_floor("IV").unwrap(), "4/?");
        assert_eq!(normalize_floor("X/XII").unwrap(), "10/XII");
        // Only the first slash splits.
        assert_eq!(normalize_floor("II/5/a").unwrap(), "2/5/a");
    }

    #[test]
    fn bad_floor_notation_propagates() {
        assert!(normalize_floor("SUT/4").is_err());
        assert!(normalize_floor("3/4").is_err());
        assert!(normalize_floor("/4").is_err());
    }
}
