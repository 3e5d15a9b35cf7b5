use crate::agent::MovieRecommender;
use crate::error::Result;
use crossterm::style::Stylize;
use std::io::{BufRead, IsTerminal, Write};
use tracing::error;

pub const PANEL_TITLE: &str = "Cinephile Bot";
const PROMPT: &str = ">> ";
const EXIT_HINT: &str = "Type exit to quit.";
const DEFAULT_WIDTH: usize = 80;

#[derive(Debug, Clone, Copy)]
pub struct PanelStyle {
    pub width: usize,
    pub color: bool,
}

impl PanelStyle {
    pub fn plain(width: usize) -> Self {
        Self {
            width: width.max(10),
            color: false,
        }
    }

    /// Sized to the terminal, colored only when stdout is a tty.
    pub fn for_terminal() -> Self {
        let width = crossterm::terminal::size()
            .map(|(cols, _)| cols as usize)
            .unwrap_or(DEFAULT_WIDTH);
        Self {
            width: width.clamp(20, 120),
            color: std::io::stdout().is_terminal(),
        }
    }
}

fn wrap_line(line: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in line.split_whitespace() {
        let mut word = word.to_string();
        while word.chars().count() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let head: String = word.chars().take(width).collect();
            word = word.chars().skip(width).collect();
            lines.push(head);
        }

        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Draw `body` inside a rounded box with `title` centered in the top border.
pub fn render_panel(title: &str, body: &str, style: PanelStyle) -> String {
    let inner = style.width.saturating_sub(4).max(1);
    let paint_border = |s: String| {
        if style.color {
            s.dark_blue().to_string()
        } else {
            s
        }
    };

    let label = format!(" {} ", title);
    let fill = (inner + 2).saturating_sub(label.chars().count());
    let left = fill / 2;
    let right = fill - left;
    let painted_label = if style.color {
        label.bold().to_string()
    } else {
        label
    };

    let mut out = format!(
        "{}{}{}\n",
        paint_border(format!("╭{}", "─".repeat(left))),
        painted_label,
        paint_border(format!("{}╮", "─".repeat(right)))
    );

    for line in body.trim_end().lines().flat_map(|l| wrap_line(l, inner)) {
        let pad = inner.saturating_sub(line.chars().count());
        out.push_str(&format!(
            "{} {}{} {}\n",
            paint_border("│".to_string()),
            line,
            " ".repeat(pad),
            paint_border("│".to_string())
        ));
    }

    out.push_str(&paint_border(format!("╰{}╯", "─".repeat(inner + 2))));
    out.push('\n');
    out
}

/// Greeting panel. Padding is measured on the plain hint before it is colored.
fn intro_panel(greeting: &str, style: PanelStyle) -> String {
    let panel = render_panel(PANEL_TITLE, &format!("{}\n\n{}", greeting, EXIT_HINT), style);
    if !style.color {
        return panel;
    }
    let colored = format!("Type {} to {}.", "exit".italic().yellow(), "quit".red());
    panel.replace(EXIT_HINT, &colored)
}

pub fn is_exit_command(input: &str) -> bool {
    let input = input.trim();
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

/// Interactive loop: greet, then answer every line until exit or end of input.
pub async fn question_loop<R: BufRead, W: Write>(
    recommender: &mut MovieRecommender,
    mut input: R,
    output: &mut W,
    style: PanelStyle,
) -> Result<()> {
    write!(output, "{}", intro_panel(recommender.introduce(), style))?;

    loop {
        write!(output, "{}", PROMPT)?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            writeln!(output, "Goodbye!")?;
            return Ok(());
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_exit_command(line) {
            writeln!(output, "Goodbye!")?;
            return Ok(());
        }

        match recommender.chat(line).await {
            Ok(reply) => write!(output, "{}", render_panel(PANEL_TITLE, &reply, style))?,
            Err(e) => {
                error!(error = %e, "Chat request failed");
                writeln!(output, "Error: {}", e)?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CinephileError;
    use crate::providers::{CompletionRequest, CompletionResponse, Provider, ProviderInfo};
    use async_trait::async_trait;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct EchoProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Provider for EchoProvider {
        fn info(&self) -> ProviderInfo {
            ProviderInfo {
                name: "echo".into(),
                display_name: "Echo".into(),
                default_model: "echo".into(),
            }
        }

        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CinephileError::Authentication("no key".into()));
            }
            let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(CompletionResponse::new("id".into(), "echo".into(), format!("You said: {}", last)))
        }

        fn is_authenticated(&self) -> bool {
            true
        }
    }

    fn recommender(fail: bool) -> (MovieRecommender, Arc<EchoProvider>) {
        let provider = Arc::new(EchoProvider {
            calls: AtomicUsize::new(0),
            fail,
        });
        (MovieRecommender::new(provider.clone(), "echo".into(), None), provider)
    }

    async fn run(recommender: &mut MovieRecommender, input: &str) -> String {
        let mut output = Vec::new();
        question_loop(recommender, Cursor::new(input.to_string()), &mut output, PanelStyle::plain(40))
            .await
            .unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_exit_commands() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command("  QUIT \n"));
        assert!(is_exit_command("Exit"));
        assert!(!is_exit_command("exit now"));
        assert!(!is_exit_command(""));
    }

    #[test]
    fn test_render_panel_plain() {
        let panel = render_panel("Bot", "Hello there", PanelStyle::plain(20));
        let lines: Vec<&str> = panel.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with('╭') && lines[0].contains(" Bot ") && lines[0].ends_with('╮'));
        assert_eq!(lines[1], "│ Hello there      │");
        assert_eq!(lines[2], format!("╰{}╯", "─".repeat(18)));
        assert!(lines.iter().all(|l| l.chars().count() == 20));
    }

    fn visible_width(line: &str) -> usize {
        let ansi = regex::Regex::new(r"\x1b\[[0-9;]*m").unwrap();
        ansi.replace_all(line, "").chars().count()
    }

    #[test]
    fn test_colored_intro_keeps_borders_aligned() {
        let style = PanelStyle {
            width: 50,
            color: true,
        };
        let panel = intro_panel("Hi, what are you in the mood for?", style);

        assert!(panel.contains('\x1b'));
        assert!(!panel.contains(EXIT_HINT));
        for line in panel.lines() {
            assert_eq!(visible_width(line), 50, "{:?}", line);
        }
    }

    #[test]
    fn test_wrap_line() {
        assert_eq!(wrap_line("one two three", 7), vec!["one two", "three"]);
        assert_eq!(wrap_line("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap_line("", 10), vec![""]);
    }

    #[tokio::test]
    async fn test_loop_replies_and_exits() {
        let (mut recommender, provider) = recommender(false);
        let out = run(&mut recommender, "\nsci-fi please\nexit\nnever read\n").await;

        assert!(out.contains(PANEL_TITLE));
        assert!(out.contains("Type exit to quit."));
        assert!(out.contains("You said: sci-fi please"));
        assert!(out.trim_end().ends_with("Goodbye!"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(recommender.history().len(), 4);
    }

    #[tokio::test]
    async fn test_loop_exits_on_eof() {
        let (mut recommender, provider) = recommender(false);
        let out = run(&mut recommender, "").await;

        assert!(out.contains(">> "));
        assert!(out.trim_end().ends_with("Goodbye!"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_loop_survives_errors() {
        let (mut recommender, _) = recommender(true);
        let out = run(&mut recommender, "hello\nquit\n").await;

        assert!(out.contains("Error: Authentication failed"));
        assert!(out.trim_end().ends_with("Goodbye!"));
        assert_eq!(recommender.history().len(), 2);
    }
}
