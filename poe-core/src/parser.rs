//! `show poe status` screen scraping
//!
//! Best-effort: anything that does not look like an 8-column data row is
//! dropped without error. Fields stay as the switch printed them.

use serde::{Deserialize, Serialize};

/// Substrings that disqualify a line: header, separator run, CLI prompt.
const SKIP_MARKERS: [&str; 3] = ["Intf", "---------", "#"];

const FIELD_COUNT: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoeStatusRecord {
    pub intf: String,
    pub detection: String,
    pub class: String,
    pub consumed: String,
    pub voltage: String,
    pub current: String,
    pub meter: String,
    pub temp: String,
}

impl PoeStatusRecord {
    fn from_tokens(tokens: &[&str]) -> Option<Self> {
        if tokens.len() < FIELD_COUNT {
            return None;
        }
        Some(Self {
            intf: tokens[0].to_string(),
            detection: tokens[1].to_string(),
            class: tokens[2].to_string(),
            consumed: tokens[3].to_string(),
            voltage: tokens[4].to_string(),
            current: tokens[5].to_string(),
            meter: tokens[6].to_string(),
            temp: tokens[7].to_string(),
        })
    }
}

fn is_data_candidate(line: &str) -> bool {
    !line.is_empty() && !SKIP_MARKERS.iter().any(|marker| line.contains(marker))
}

/// Parse a transcript that may hold several concatenated command outputs.
pub fn parse_poe_status(transcript: &str) -> Vec<PoeStatusRecord> {
    transcript
        .trim()
        .lines()
        .filter(|line| is_data_candidate(line))
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            PoeStatusRecord::from_tokens(&tokens)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Intf      Detection      Class   Consumed(W) Voltage(V) Current(mA) Consumed Meter(Whr) Temperature(c)";
    const SEPARATOR: &str = "--------- -------------- ------- ----------- ---------- ----------- ------------------ --------------";

    #[test]
    fn test_rows_in_order_with_noise() {
        let transcript = [
            "(UBNT) #show poe status all",
            "",
            HEADER,
            SEPARATOR,
            "0/1       Good           Class4  4.25        53.12      80.12       12.34              41",
            "garbage line",
            "0/2       Searching      Unknown 0.00        0.00       0.00        0.00               40",
            "0/3  Good",
            "0/4       Good           Class0  2.10        53.09      39.55       1.02               42",
            "(UBNT) #",
        ]
        .join("\r\n");

        let records = parse_poe_status(&transcript);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].intf, "0/1");
        assert_eq!(records[0].detection, "Good");
        assert_eq!(records[0].class, "Class4");
        assert_eq!(records[0].consumed, "4.25");
        assert_eq!(records[0].voltage, "53.12");
        assert_eq!(records[0].current, "80.12");
        assert_eq!(records[0].meter, "12.34");
        assert_eq!(records[0].temp, "41");
        assert_eq!(records[1].intf, "0/2");
        assert_eq!(records[1].class, "Unknown");
        assert_eq!(records[2].intf, "0/4");
    }

    #[test]
    fn test_extra_tokens_ignored() {
        let records = parse_poe_status("0/5 Good Class2 1 2 3 4 5 extra tokens here");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].temp, "5");
    }

    #[test]
    fn test_no_rows_is_empty_not_error() {
        assert!(parse_poe_status("").is_empty());
        assert!(parse_poe_status(&format!("{HEADER}\n{SEPARATOR}\n(UBNT) #")).is_empty());
    }

    #[test]
    fn test_markers_match_as_substrings() {
        // Well formed rows, but each carries a marker somewhere inside a token
        let transcript = "\
0/6 Good Class4 1 2 3 4 #5
0/7 Good Class4 1 2 3 4 xIntfx
0/8 Good Class4 1 2 3 4 a---------b
0/9 Good Class4 1 2 3 4 5";
        let records = parse_poe_status(transcript);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].intf, "0/9");
    }

    #[test]
    fn test_concatenated_outputs() {
        let first = format!("{HEADER}\n{SEPARATOR}\n0/1 Good Class4 1 2 3 4 5\n");
        let second = format!("{HEADER}\n{SEPARATOR}\n0/2 Good Class3 6 7 8 9 10\n");
        let records = parse_poe_status(&(first + &second));
        let intfs: Vec<_> = records.iter().map(|r| r.intf.as_str()).collect();
        assert_eq!(intfs, ["0/1", "0/2"]);
    }
}
