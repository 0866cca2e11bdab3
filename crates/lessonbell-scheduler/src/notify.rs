//! Message formatter — renders the subject, plain-text and HTML bodies for a lesson.
//! Pure: the same fields and kind always give byte-identical output.

use lessonbell_core::{EmailMessage, LessonField, LessonFields};

/// Why a message is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Batch reminder: the deadline is `days_ahead` days away.
    Reminder { days_ahead: u32 },
    /// Someone edited the Timeline.
    TimelineChanged,
}

impl MessageKind {
    fn heading(&self) -> &'static str {
        match self {
            Self::Reminder { .. } => "Upcoming Lesson Deadline",
            Self::TimelineChanged => "Timeline Changed for a Lesson",
        }
    }

    fn intro_text(&self) -> String {
        match self {
            Self::Reminder { days_ahead } => format!(
                "This is a reminder that the deadline for the following lesson is in {}.",
                days_phrase(*days_ahead)
            ),
            Self::TimelineChanged => {
                "The timeline for the following lesson has been changed:".to_string()
            }
        }
    }

    fn intro_html(&self) -> String {
        match self {
            Self::Reminder { days_ahead } => format!(
                "The deadline for the following lesson is in <b>{}</b>:",
                days_phrase(*days_ahead)
            ),
            Self::TimelineChanged => {
                "The timeline for the following lesson has been <b>changed</b>:".to_string()
            }
        }
    }
}

fn days_phrase(days: u32) -> String {
    match days {
        0 => "less than a day".to_string(),
        1 => "1 day".to_string(),
        n => format!("{n} days"),
    }
}

/// Subject line.
pub fn subject(fields: &LessonFields, kind: MessageKind) -> String {
    match kind {
        MessageKind::Reminder { .. } => format!(
            "{}, {}",
            fields.customer().unwrap_or("Unknown"),
            fields.issue().unwrap_or("No Issue")
        ),
        MessageKind::TimelineChanged => format!(
            "Timeline Changed: {}, {}",
            fields.customer().unwrap_or_default(),
            fields.issue().unwrap_or_default()
        ),
    }
}

/// The label/value rows shared by both bodies. Missing values render as "".
pub fn rows(fields: &LessonFields) -> Vec<(&'static str, &str)> {
    LessonField::ALL
        .iter()
        .map(|f| (f.label(), fields.get(*f).unwrap_or_default()))
        .collect()
}

/// Plain-text body.
pub fn text_body(fields: &LessonFields, kind: MessageKind) -> String {
    let lines: Vec<String> = rows(fields)
        .into_iter()
        .map(|(label, value)| format!("{label}: {value}"))
        .collect();
    format!("{}\n\n{}", kind.intro_text(), lines.join("\n"))
}

/// HTML body: same rows, same order, Timeline highlighted.
pub fn html_body(fields: &LessonFields, kind: MessageKind) -> String {
    const CELL: &str = "padding:8px 16px;";
    const LABEL: &str = "padding:8px 16px; font-weight:600;";
    const HL_LABEL: &str = "padding:8px 16px; font-weight:600; background:#e4ede9;";
    const HL_CELL: &str =
        "padding:8px 16px; background:#e4ede9; font-weight:600; color:#1f6a4a;";

    let mut table_rows = String::new();
    for (label, value) in rows(fields) {
        let (label_style, cell_style) = if label == LessonField::Timeline.label() {
            (HL_LABEL, HL_CELL)
        } else {
            (LABEL, CELL)
        };
        table_rows.push_str(&format!(
            "<tr><td style=\"{label_style}\">{}</td><td style=\"{cell_style}\">{}</td></tr>\n",
            escape_html(label),
            escape_html(value)
        ));
    }

    format!(
        "<div style=\"font-family: 'Segoe UI', Arial, sans-serif; background: #f6faf8; padding: 24px; color: #234c36;\">\n\
<h2 style=\"color: #1f6a4a;\">{heading}</h2>\n\
<p style=\"font-size: 1.1em;\">{intro}</p>\n\
<table style=\"border-collapse: collapse; background: #fff; border-radius: 8px; overflow: hidden;\">\n\
<tbody>\n{table_rows}</tbody>\n\
</table>\n\
<p style=\"margin-top: 24px; color: #256c3a; font-size: 1em;\">This is an automated notification from the Lessons Learned system.<br>If you have any questions, please contact your administrator.</p>\n\
</div>",
        heading = kind.heading(),
        intro = kind.intro_html(),
    )
}

/// Render the full message.
pub fn format_message(fields: &LessonFields, kind: MessageKind) -> EmailMessage {
    EmailMessage {
        subject: subject(fields, kind),
        text_body: text_body(fields, kind),
        html_body: Some(html_body(fields, kind)),
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
