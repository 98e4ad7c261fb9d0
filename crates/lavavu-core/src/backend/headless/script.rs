//! Command table and line splitting for the headless script interpreter

pub(crate) struct CommandInfo {
    pub name: &'static str,
    pub category: &'static str,
    pub usage: &'static str,
    pub help: &'static str,
}

const fn command(
    name: &'static str,
    category: &'static str,
    usage: &'static str,
    help: &'static str,
) -> CommandInfo {
    CommandInfo {
        name,
        category,
        usage,
        help,
    }
}

pub(crate) const COMMANDS: &[CommandInfo] = &[
    command("quit", "General", "quit", "Stop the render loop"),
    command("help", "General", "help [command]", "Show help for a command"),
    command("open", "General", "open path", "Load a state, script or image file"),
    command("file", "General", "file path", "Load a state, script or image file"),
    command("image", "General", "image [filename]", "Render and save an image"),
    command("render", "General", "render", "Render a frame"),
    command("redraw", "General", "redraw", "Render a frame"),
    command("resize", "General", "resize width height", "Change the output resolution"),
    command("select", "Object", "select [name|index]", "Select an object, or clear the selection"),
    command("hide", "Object", "hide [name|index]", "Hide an object"),
    command("show", "Object", "show [name|index]", "Show an object"),
    command("delete", "Object", "delete [name|index]", "Delete an object"),
    command("clear", "Object", "clear [objects|data]", "Remove objects, or selected data"),
    command("rotate", "View", "rotate x|y|z degrees | rotate x y z", "Rotate the camera"),
    command("translate", "View", "translate x|y|z dist | translate x y z", "Translate the camera"),
    command("zoom", "View", "zoom factor", "Scale the camera zoom"),
    command("reset", "View", "reset", "Reset the camera"),
    command("background", "View", "background colour", "Set the background colour"),
    command("figure", "View", "figure name", "Load a figure, creating it if missing"),
    command("savefigure", "View", "savefigure [name]", "Save the current view as a figure"),
    command("timestep", "Time", "timestep step", "Jump to a time step"),
    command("next", "Time", "next", "Advance to the next time step"),
    command("key", "Input", "key code,x,y[,modifiers]", "Keyboard event"),
    command("mouse", "Input", "mouse x,y,action[,button,modifiers]", "Mouse event"),
];

pub(crate) fn lookup(name: &str) -> Option<&'static CommandInfo> {
    COMMANDS.iter().find(|c| c.name == name)
}

pub(crate) fn help_text(info: &CommandInfo, markdown: bool) -> String {
    if markdown {
        format!("**{}**\n\n```\n{}\n```\n\n{}\n", info.name, info.usage, info.help)
    } else {
        format!("{}\n  {}\n", info.usage, info.help)
    }
}

/// Split script text into lines on newlines and `;`, skipping blanks and comments
pub(crate) fn split_lines(text: &str) -> Vec<&str> {
    text.split(['\n', ';'])
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

/// First word and the remainder
pub(crate) fn split_command(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    }
}

/// Parse up to three numbers from `a b c` or `a,b,c`
pub(crate) fn numbers(args: &str) -> Vec<f64> {
    args.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect()
}

/// Axis index for `x`, `y` or `z`
pub(crate) fn axis(name: &str) -> Option<usize> {
    match name {
        "x" | "X" => Some(0),
        "y" | "Y" => Some(1),
        "z" | "Z" => Some(2),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_lines() {
        let lines = split_lines("select pts\n  # comment\nrotate x 90; zoom 2\n\n");
        assert_eq!(lines, vec!["select pts", "rotate x 90", "zoom 2"]);
    }

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("rotate  x 90"), ("rotate", "x 90"));
        assert_eq!(split_command("reset"), ("reset", ""));
    }

    #[test]
    fn test_numbers_and_axis() {
        assert_eq!(numbers("1, 2 3"), vec![1.0, 2.0, 3.0]);
        assert_eq!(axis("y"), Some(1));
        assert_eq!(axis("w"), None);
    }

    #[test]
    fn test_help_text() {
        let info = lookup("zoom").unwrap();
        assert!(help_text(info, true).starts_with("**zoom**"));
        assert!(help_text(info, false).contains("Scale the camera zoom"));
    }
}
