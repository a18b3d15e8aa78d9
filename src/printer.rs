use terminal_size::{terminal_size, Width};

use crate::api::Command;
use crate::lang::Lang;

const FALLBACK_WIDTH: usize = 80;
const PADDING: usize = 2;
// Allows three average words with spaces between them.
const MINIMUM_HELP_WIDTH: usize = 17;

/// Render the help page for a command: a usage line plus option and
/// subcommand tables. The output lands in the built-in sink, never on
/// stdout.
pub(crate) fn render_help(command: &Command, lang: &Lang) -> String {
    let width = if let Some((Width(w), _)) = terminal_size() {
        w as usize
    } else {
        FALLBACK_WIDTH
    };

    let mut usage = format!("{} {}", lang.render("help.usage", &[]), command.name());
    for slot in command.args_ref().iter() {
        if slot.is_hidden() {
            continue;
        }
        if slot.is_optional() {
            usage.push_str(&format!(" [{}]", slot.name()));
        } else {
            usage.push_str(&format!(" <{}>", slot.name()));
        }
    }
    if !command.options_ref().is_empty() {
        usage.push_str(" [options]");
    }
    if !command.subcommands_ref().is_empty() {
        let names: Vec<&str> = command
            .subcommands_ref()
            .iter()
            .map(|sub| sub.name())
            .collect();
        usage.push_str(&format!(" {{{}}}", names.join(",")));
    }

    let mut entries: Vec<(String, String)> = Vec::default();
    let mut sections: Vec<(String, usize)> = Vec::default();

    let noticed: Vec<&crate::api::Arg> = command
        .args_ref()
        .iter()
        .filter(|slot| !slot.is_hidden() && slot.notice_text().is_some())
        .collect();
    if !noticed.is_empty() {
        sections.push((lang.render("help.arguments", &[]), entries.len()));
        for slot in noticed {
            entries.push((
                slot.name().to_string(),
                slot.notice_text().unwrap_or_default().to_string(),
            ));
        }
    }

    if !command.options_ref().is_empty() {
        sections.push((lang.render("help.options", &[]), entries.len()));
        for option in command.options_ref() {
            let left = option.aliases().join(", ");
            let right = option.help_text().unwrap_or_default().to_string();
            entries.push((left, right));
        }
    }
    if !command.subcommands_ref().is_empty() {
        sections.push((lang.render("help.subcommands", &[]), entries.len()));
        for subcommand in command.subcommands_ref() {
            let left = subcommand.aliases().join(", ");
            let right = subcommand.help_text().unwrap_or_default().to_string();
            entries.push((left, right));
        }
    }

    let left_width = entries
        .iter()
        .map(|(left, _)| left.len())
        .max()
        .unwrap_or_default();
    let help_width = width
        .saturating_sub(left_width + PADDING + 1)
        .max(MINIMUM_HELP_WIDTH);

    let mut lines = vec![usage];
    let mut section_iter = sections.iter().peekable();
    for (index, (left, right)) in entries.iter().enumerate() {
        while let Some((heading, at)) = section_iter.peek() {
            if *at == index {
                lines.push(heading.clone());
                section_iter.next();
            } else {
                break;
            }
        }
        let mut first = true;
        for part in chunk(right, help_width) {
            if first {
                lines.push(format!(" {left:left_width$}{:PADDING$}{part}", ""));
                first = false;
            } else {
                lines.push(format!(" {:left_width$}{:PADDING$}{part}", "", ""));
            }
        }
        if first {
            lines.push(format!(" {left}"));
        }
    }
    lines.join("\n")
}

/// Word-wrap a paragraph to the given width.
fn chunk(paragraph: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::default();
    let mut current = String::default();

    for word in paragraph.split(' ') {
        if word.is_empty() {
            continue;
        }
        if current.is_empty() {
            current.push_str(word);
        } else if current.len() + word.len() + 1 <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Args, Opt, Subcommand};
    use crate::pattern::Pattern;
    use crate::test::assert_contains;

    #[test]
    fn help_lists_options_and_subcommands() {
        let command = Command::new("/pip")
            .args(Args::new().slot("target", Pattern::text()))
            .option(Opt::new("-v|--verbose").help("noisier output"))
            .subcommand(Subcommand::new("install").help("install a package"))
            .build()
            .unwrap();

        let help = render_help(&command, &Lang::default());
        assert_contains!(help, "usage: /pip <target> [options] {install}");
        assert_contains!(help, "-v, --verbose");
        assert_contains!(help, "noisier output");
        assert_contains!(help, "install a package");
        assert_contains!(help, "options:");
        assert_contains!(help, "subcommands:");
    }

    #[test]
    fn argument_notices_render() {
        let command = Command::new("demo")
            .args(Args::new().add(
                crate::api::Arg::new("path", Pattern::text()).notice("where to look"),
            ))
            .build()
            .unwrap();
        let help = render_help(&command, &Lang::default());
        assert_contains!(help, "arguments:");
        assert_contains!(help, "where to look");
    }

    #[test]
    fn optional_args_render_bracketed() {
        let command = Command::new("demo")
            .args(Args::new().add(crate::api::Arg::new("path", Pattern::text()).optional()))
            .build()
            .unwrap();
        let help = render_help(&command, &Lang::default());
        assert_contains!(help, "usage: demo [path]");
    }

    #[test]
    fn chunk_wraps_words() {
        let parts = chunk("one two three four", 9);
        assert_eq!(parts, vec!["one two", "three", "four"]);
    }
}
