//! Input configuration options for lookout
//!
//! Key lists for every action, read from the `[keys]` table of lookout.toml.

use serde::Deserialize;

/// Input configuration options of all actions
#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct Keys {
    open: Vec<String>,
    go_up: Vec<String>,
    go_down: Vec<String>,
    go_parent: Vec<String>,
    go_back: Vec<String>,
    go_to_top: Vec<String>,
    go_to_bottom: Vec<String>,
    toggle_expand: Vec<String>,
    refresh: Vec<String>,
    toggle_hidden: Vec<String>,
    toggle_line_numbers: Vec<String>,
    cycle_theme: Vec<String>,
    toggle_tree: Vec<String>,
    toggle_markdown: Vec<String>,
    copy_path: Vec<String>,
    scroll_preview_up: Vec<String>,
    scroll_preview_down: Vec<String>,
    quit: Vec<String>,
}

macro_rules! accessor {
    ($($name:ident),+ $(,)?) => {
        impl Keys {
            $(
                #[inline]
                pub fn $name(&self) -> &[String] {
                    &self.$name
                }
            )+
        }
    };
}

accessor!(
    open,
    go_up,
    go_down,
    go_parent,
    go_back,
    go_to_top,
    go_to_bottom,
    toggle_expand,
    refresh,
    toggle_hidden,
    toggle_line_numbers,
    cycle_theme,
    toggle_tree,
    toggle_markdown,
    copy_path,
    scroll_preview_up,
    scroll_preview_down,
    quit,
);

/// Default input configuration options
impl Default for Keys {
    fn default() -> Self {
        Keys {
            open: vec!["Enter".into(), "l".into(), "Right".into()],
            go_up: vec!["k".into(), "Up".into()],
            go_down: vec!["j".into(), "Down".into()],
            go_parent: vec!["h".into(), "Left".into()],
            go_back: vec!["Backspace".into(), "b".into()],
            go_to_top: vec!["g".into()],
            go_to_bottom: vec!["G".into()],
            toggle_expand: vec!["Tab".into(), "space".into()],
            refresh: vec!["r".into(), "Ctrl+r".into()],
            toggle_hidden: vec![".".into()],
            toggle_line_numbers: vec!["n".into()],
            cycle_theme: vec!["t".into()],
            toggle_tree: vec!["f".into()],
            toggle_markdown: vec!["m".into()],
            copy_path: vec!["c".into()],
            scroll_preview_up: vec!["K".into(), "PageUp".into()],
            scroll_preview_down: vec!["J".into(), "PageDown".into()],

            quit: vec!["q".into(), "Esc".into(), "Ctrl+c".into()],
        }
    }
}
