//! `show poe status` transcript builders

pub const HEADER: &str =
    "Intf      Detection      Class   Consumed(W) Voltage(V) Current(mA) Consumed Meter(Whr) Temperature(c)";
pub const SEPARATOR: &str =
    "--------- -------------- ------- ----------- ---------- ----------- ------------------ --------------";

/// Builds a status table the way the switch prints it (CRLF, header, separator).
#[derive(Debug, Clone)]
pub struct PoeTableBuilder {
    lines: Vec<String>,
}

impl Default for PoeTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PoeTableBuilder {
    pub fn new() -> Self {
        Self {
            lines: vec![HEADER.to_string(), SEPARATOR.to_string()],
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn row(
        mut self,
        intf: &str,
        detection: &str,
        class: &str,
        consumed: &str,
        voltage: &str,
        current: &str,
        meter: &str,
        temp: &str,
    ) -> Self {
        self.lines.push(format!(
            "{intf:<9} {detection:<14} {class:<7} {consumed:<11} {voltage:<10} {current:<11} {meter:<18} {temp}"
        ));
        self
    }

    /// A powered device drawing a few watts on `0/<port>`
    pub fn powered(self, port: u32) -> Self {
        self.row(&format!("0/{port}"), "Good", "Class4", "4.25", "53.12", "80.12", "12.34", "41")
    }

    /// A port with nothing plugged in
    pub fn searching(self, port: u32) -> Self {
        self.row(&format!("0/{port}"), "Searching", "Unknown", "0.00", "0.00", "0.00", "0.00", "40")
    }

    /// A line the parser must drop
    pub fn noise(mut self, line: &str) -> Self {
        self.lines.push(line.to_string());
        self
    }

    pub fn build(&self) -> String {
        self.lines.join("\r\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poe_core::parse_poe_status;

    #[test]
    fn test_builder_output_parses() {
        let table = PoeTableBuilder::new()
            .powered(1)
            .noise("--More-- or (q)uit")
            .searching(2)
            .build();

        let records = parse_poe_status(&table);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].intf, "0/1");
        assert_eq!(records[1].detection, "Searching");
    }
}
