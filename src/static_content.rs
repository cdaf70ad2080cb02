//! Static content generation commands.
//!
//! One `setup:static-content:deploy` invocation is generated per locale and
//! the whole batch is handed to `xargs -P` as a single shell command. xargs
//! reports one exit status for the batch, so a failing locale is not
//! distinguishable from the others.

use crate::shell::shell_quote;

/// Application CLI entry point, relative to the deployment root
pub const MAGENTO_CLI: &str = "php ./bin/magento";

/// What to generate and how wide to fan out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticContentPlan {
    pub locales: Vec<String>,
    pub excluded_themes: Vec<String>,
    /// `xargs -P` value; 0 runs as many processes as possible
    pub threads: u32,
    pub verbosity: Option<&'static str>,
}

impl StaticContentPlan {
    /// `--exclude-theme=<name>` for every excluded theme
    pub fn exclude_flags(&self) -> Vec<String> {
        self.excluded_themes
            .iter()
            .map(|theme| format!("--exclude-theme={theme}"))
            .collect()
    }

    /// Generator invocation restricted to `locale`
    pub fn locale_command(&self, locale: &str) -> String {
        let mut parts = vec![
            MAGENTO_CLI.to_string(),
            "setup:static-content:deploy".to_string(),
            "-f".to_string(),
        ];
        parts.extend(self.exclude_flags().iter().map(|flag| shell_quote(flag)));
        parts.push(shell_quote(locale));
        if let Some(flag) = self.verbosity {
            parts.push(flag.to_string());
        }
        parts.join(" ")
    }

    pub fn locale_commands(&self) -> Vec<String> {
        self.locales
            .iter()
            .map(|locale| self.locale_command(locale))
            .collect()
    }

    /// Single shell command running every locale command through `xargs`
    pub fn fan_out_command(&self) -> String {
        fan_out(&self.locale_commands(), self.threads)
    }
}

/// Pipe `commands` into `xargs`, running at most `threads` at once.
///
/// Items are newline-delimited (`-d '\n'`) so xargs leaves the quoting of
/// each command alone and `bash -c` sees it intact.
pub fn fan_out(commands: &[String], threads: u32) -> String {
    let items: Vec<String> = commands.iter().map(|command| shell_quote(command)).collect();
    format!(
        "printf '%s\\n' {} | xargs -d '\\n' -I CMD -P {} bash -c CMD",
        items.join(" "),
        threads
    )
}
