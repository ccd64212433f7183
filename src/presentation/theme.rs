use colored::Colorize;

pub struct Theme {
    pub title: fn(&str) -> String,
    pub code: fn(&str) -> String,
    pub label: fn(&str) -> String,
    pub value: fn(&str) -> String,
    pub good: fn(&str) -> String,
    pub bad: fn(&str) -> String,
    pub dim: fn(&str) -> String,
    pub source: fn(&str) -> String,
}

impl Theme {
    /// Colors are dropped when stdout is not a terminal or `NO_COLOR` is set;
    /// `colored` handles both.
    pub fn terminal() -> Self {
        Self {
            title: |s| s.bright_white().bold().to_string(),
            code: |s| s.cyan().to_string(),
            label: |s| s.bright_black().to_string(),
            value: |s| s.normal().to_string(),
            good: |s| s.green().to_string(),
            bad: |s| s.red().to_string(),
            dim: |s| s.bright_black().dimmed().to_string(),
            source: |s| s.yellow().italic().to_string(),
        }
    }

    pub fn plain() -> Self {
        Self {
            title: str::to_string,
            code: str::to_string,
            label: str::to_string,
            value: str::to_string,
            good: str::to_string,
            bad: str::to_string,
            dim: str::to_string,
            source: str::to_string,
        }
    }

    pub fn flag(&self, on: bool, yes: &str, no: &str) -> String {
        if on {
            (self.good)(yes)
        } else {
            (self.bad)(no)
        }
    }
}
