// Platform-neutral embed model.
//
// Handlers build replies out of these types so they never touch serenity.
// The Discord layer converts them into `CreateEmbed` right before sending.

use chrono::{DateTime, Utc};

/// Discord caps embed descriptions at 4096 chars; we stay a little below.
pub const MAX_DESCRIPTION_LEN: usize = 4000;
pub const MAX_FIELD_VALUE_LEN: usize = 1024;

/// Named colour presets shared by every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedColor {
    Success,
    Error,
    Warning,
    Info,
    Default,
    Custom(u32),
}

impl EmbedColor {
    pub fn value(self) -> u32 {
        match self {
            EmbedColor::Success => 0x00FF00,
            EmbedColor::Error => 0xFF0000,
            EmbedColor::Warning => 0xFF9900,
            EmbedColor::Info => 0x00AAFF,
            EmbedColor::Default => 0x7289DA,
            EmbedColor::Custom(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: Option<u32>,
    pub fields: Vec<EmbedField>,
    pub footer: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub thumbnail: Option<String>,
}

impl Embed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        let text: String = description.into();
        self.description = Some(truncate_text(&text, MAX_DESCRIPTION_LEN, "..."));
        self
    }

    pub fn color(mut self, color: EmbedColor) -> Self {
        self.color = Some(color.value());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        let value: String = value.into();
        self.fields.push(EmbedField {
            name: name.into(),
            value: truncate_text(&value, MAX_FIELD_VALUE_LEN, "..."),
            inline,
        });
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    pub fn timestamp_now(mut self) -> Self {
        self.timestamp = Some(Utc::now());
        self
    }

    #[allow(dead_code)]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[allow(dead_code)]
    pub fn thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail = Some(url.into());
        self
    }
}

/// Cut `text` to at most `max_len` characters, ending with `suffix` when cut.
pub fn truncate_text(text: &str, max_len: usize, suffix: &str) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }

    let keep = max_len.saturating_sub(suffix.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(suffix);
    out
}

/// Human-readable duration, e.g. "1 hour and 5 minutes" or "2 days".
pub fn format_duration(total_minutes: u64) -> String {
    fn unit(n: u64, word: &str) -> String {
        if n == 1 {
            format!("1 {}", word)
        } else {
            format!("{} {}s", n, word)
        }
    }

    if total_minutes == 0 {
        return "0 minutes".to_string();
    }
    if total_minutes < 60 {
        return unit(total_minutes, "minute");
    }

    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    if hours < 24 {
        return if minutes > 0 {
            format!("{} and {}", unit(hours, "hour"), unit(minutes, "minute"))
        } else {
            unit(hours, "hour")
        };
    }

    let days = hours / 24;
    let hours = hours % 24;
    if hours > 0 {
        format!("{} and {}", unit(days, "day"), unit(hours, "hour"))
    } else {
        unit(days, "day")
    }
}
