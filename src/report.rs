//! Text rendering of the platforms table and the layer history.

use crossterm::style::Stylize;

use crate::history::ImageHistory;
use crate::platform::Platform;

/// One line of the platforms table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformRow {
    pub platform: String,
    pub size: String,
    pub digest: String,
}

/// Accumulates report text. Labels are bold bright white unless color is off.
pub struct Report {
    out: String,
    color: bool,
}

impl Report {
    pub fn new(color: bool) -> Self {
        Self {
            out: String::new(),
            color,
        }
    }

    pub fn finish(self) -> String {
        self.out
    }

    fn label(&mut self, text: &str) {
        if self.color {
            self.out.push_str(&text.white().bold().to_string());
        } else {
            self.out.push_str(text);
        }
    }

    fn text(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn field(&mut self, label: &str, value: impl std::fmt::Display) {
        self.label(label);
        self.text(&format!("{value}\n"));
    }

    pub fn platforms(&mut self, rows: &[PlatformRow]) {
        self.label("Available platforms:\n\n");
        self.label(&table_line("platform", "size", "digest"));
        for row in rows {
            self.text(&table_line(&row.platform, &row.size, &row.digest));
        }
    }

    pub fn history(&mut self, history: &ImageHistory, platform: &Platform) {
        self.label("\n\nData layers: ");
        self.text(&format!("{}\n", history.data_layers()));
        self.field("Empty layers: ", history.empty_layers());
        self.field("Last pushed: ", &history.last_pushed);
        self.label("\n\nLayers history for platform: ");
        self.text(&format!("{platform}\n\n"));

        for (i, entry) in history.entries.iter().enumerate() {
            self.field("layer: ", i + 1);
            self.field("size: ", &entry.layer_size);
            self.field("empty_layer: ", entry.empty_layer);
            self.field("created: ", &entry.created);
            if let Some(error) = &entry.format_error {
                self.field("shell format error: ", error);
            }
            self.label("created_by: ");
            if entry.created_by.contains('\n') {
                self.text("|\n");
                for line in entry.created_by.split('\n') {
                    self.text(&format!("\t{line}\n"));
                }
                self.text("\n");
            } else {
                self.text(&format!("{}\n\n", entry.created_by));
            }
        }
    }
}

fn table_line(platform: &str, size: &str, digest: &str) -> String {
    format!("{platform:>17}\t{size:>8}\t{digest:>71}\n")
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::history::HistoryEntry;
    use crate::shell::ShellFormatError;

    fn history() -> ImageHistory {
        ImageHistory {
            entries: vec![
                HistoryEntry {
                    created: "4 months".into(),
                    created_by: "/bin/sh -c #(nop) ADD file:abc in /".into(),
                    empty_layer: false,
                    layer_size: "3.2MiB".into(),
                    format_error: None,
                },
                HistoryEntry {
                    created: "4 months".into(),
                    created_by: "/bin/sh -c if a; then\n\tb\nfi".into(),
                    empty_layer: true,
                    layer_size: "0B".into(),
                    format_error: None,
                },
                HistoryEntry {
                    created: "2 weeks".into(),
                    created_by: "/bin/sh -c echo \"oops".into(),
                    empty_layer: false,
                    layer_size: "120B".into(),
                    format_error: Some(ShellFormatError {
                        line: 1,
                        column: 17,
                        message: "reached EOF without closing quote \"".into(),
                    }),
                },
            ],
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            last_pushed: "5 months".into(),
        }
    }

    #[test]
    fn renders_platform_table() {
        let mut report = Report::new(false);
        report.platforms(&[PlatformRow {
            platform: "linux/arm64/v8".into(),
            size: "3.2MiB".into(),
            digest: "sha256:abc".into(),
        }]);
        let text = report.finish();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Available platforms:");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], format!("{:>17}\t{:>8}\t{:>71}", "platform", "size", "digest"));
        assert_eq!(lines[3], format!("   linux/arm64/v8\t  3.2MiB\t{:>71}", "sha256:abc"));
    }

    #[test]
    fn renders_every_history_field() {
        let mut report = Report::new(false);
        report.history(&history(), &Platform::new("linux", "amd64", None));
        let text = report.finish();

        assert!(text.starts_with("\n\nData layers: 2\nEmpty layers: 1\nLast pushed: 5 months\n"));
        assert!(text.contains("\n\nLayers history for platform: linux/amd64\n\n"));
        assert!(text.contains(
            "layer: 1\nsize: 3.2MiB\nempty_layer: false\ncreated: 4 months\ncreated_by: /bin/sh -c #(nop) ADD file:abc in /\n\n"
        ));
        assert!(text.contains(
            "layer: 2\nsize: 0B\nempty_layer: true\ncreated: 4 months\ncreated_by: |\n\t/bin/sh -c if a; then\n\t\tb\n\tfi\n\n"
        ));
        assert!(text.contains(
            "created: 2 weeks\nshell format error: 1:17: reached EOF without closing quote \"\ncreated_by: /bin/sh -c echo \"oops\n\n"
        ));
    }

    #[test]
    fn color_only_touches_labels() {
        let mut report = Report::new(true);
        report.history(&history(), &Platform::new("linux", "amd64", None));
        let text = report.finish();
        assert!(text.contains('\u{1b}'));
        assert!(text.contains("/bin/sh -c #(nop) ADD file:abc in /\n"));

        let mut plain = Report::new(false);
        plain.history(&history(), &Platform::new("linux", "amd64", None));
        assert!(!plain.finish().contains('\u{1b}'));
    }
}
