//! Command-line argument parsing and help for lookout.
//!
//! When invoked with no address (`lk`), lookout opens the current directory.

use crate::config::Config;

/// What `main` should do after looking at the arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    RunApp { address: Option<String>, debug: bool },
    Exit,
    /// Bad arguments; exit non-zero.
    Fail,
}

pub fn handle_args() -> CliAction {
    let args: Vec<String> = std::env::args().skip(1).collect();
    parse_args(&args)
}

/// Interprets the arguments after the program name.
pub fn parse_args(args: &[String]) -> CliAction {
    let mut address: Option<String> = None;
    let mut debug = false;

    for arg in args {
        match arg.as_str() {
            "--version" | "-v" => {
                print_version();
                return CliAction::Exit;
            }
            "-h" | "--help" => {
                print_help();
                return CliAction::Exit;
            }
            "--config-help" => {
                print_config_help();
                return CliAction::Exit;
            }
            "--init" => {
                if let Err(e) = Config::generate_default(&Config::default_path()) {
                    eprintln!("Error: {}", e);
                    return CliAction::Fail;
                }
                return CliAction::Exit;
            }
            "--debug" => debug = true,
            a if !a.starts_with('-') && !a.trim().is_empty() => {
                if address.is_some() {
                    eprintln!("Error: lookout accepts only one address.");
                    eprintln!("Usage: lk [ADDRESS] or lk [OPTION]");
                    return CliAction::Fail;
                }
                address = Some(a.to_string());
            }
            a => {
                eprintln!("Unknown argument: {}", a);
                eprintln!("Try --help for available options");
                return CliAction::Fail;
            }
        }
    }

    CliAction::RunApp { address, debug }
}

fn print_version() {
    println!("lookout {}", env!("CARGO_PKG_VERSION"));
}

fn print_help() {
    println!(
        r#"lookout - browse local disks, S3 buckets, GitHub repositories and ssh hosts

USAGE:
  lk [ADDRESS] [--debug]

ADDRESS:
  /path/or/relative          local directory or file (defaults to the current directory)
  file:///path               local, explicit
  s3://bucket/prefix         object store; s3:// alone lists buckets
  github://owner/repo@ref    code host; @ref is optional (default branch)
  https://github.com/o/r     code host web URL, tree/blob links included
  ssh://user@host:port/path  remote shell over the local ssh client

OPTIONS:
      --init              Generate the default configuration
      --config-help       Display all the configuration options
      --debug             Log at debug level
  -h, --help              Print help information
  -v, --version           Display the current installed version of lookout

ENVIRONMENT:
  LOOKOUT_CONFIG          Override the default config path
  LOOKOUT_LOG             Log filter, e.g. "lookout_tui=debug" (default: info)
  AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_SESSION_TOKEN, AWS_REGION, AWS_ENDPOINT_URL
  GITHUB_TOKEN            Code host token (name configurable)
"#
    );
}

const KEYBINDS_TEXT: &str = r##"
=========================
 Key Bindings
=========================
[keys]
  open                      ["Enter", "l", "Right"]
  go_up                     ["k", "Up"]
  go_down                   ["j", "Down"]
  go_parent                 ["h", "Left"]
  go_back                   ["Backspace", "b"]
  go_to_top                 ["g"]
  go_to_bottom              ["G"]
  toggle_expand             ["Tab", "space"]
  refresh                   ["r", "Ctrl+r"]
  toggle_hidden             ["."]
  scroll_preview_up         ["K", "PageUp"]
  scroll_preview_down       ["J", "PageDown"]
  toggle_line_numbers       ["n"]
  cycle_theme               ["t"]
  toggle_tree               ["f"]
  toggle_markdown           ["m"]
  copy_path                 ["c"]
  quit                      ["q", "Esc", "Ctrl+c"]

  Syntax Reference:
    Modifiers: <c-x> (Ctrl), <m-x>/<a-x> (Alt/Meta), <s-x> (Shift)
    Standard:  ctrl+x, alt+x, shift+x, meta+x
    Special:   " ", "space", "back", "enter", "esc", "tab", "pageup", "pagedown", "home", "end"
"##;

fn print_config_help() {
    let help_text = r##"
lookout - Full Configuration Guide (lookout.toml)

=========================
 General Settings
=========================
[general]
  show_hidden                Show dotfiles [default: false]
  workers                    Background fetch threads (1..=16) [default: 4]
  max_file_size_mb           Larger files are never decoded as images [default: 20]
  readme_preview             Preview README.md when the start directory has one [default: true]

=========================
 Engine
=========================
[cache]
  capacity                   Cached directory listings [default: 256]
  ttl_secs                   Listing lifetime [default: 30]
  revalidate                 "always", "expired" or "never": when to check a cached
                             listing against the backend's revision probe

[network]
  timeout_secs               Per-call timeout for remote backends [default: 15]
  retries                    Retries for transient network errors [default: 2]
  backoff_ms                 First retry delay, doubled each attempt [default: 100]

[limits]
  sample_bytes               Bytes read for classification [default: 8192]
  text_bytes                 Text preview ceiling [default: 1 MiB]
  image_bytes                Image read ceiling [default: 20 MiB]
  image_max_side             Decoded images are scaled to fit [default: 1024]
  image_max_pixels           Larger source images are not decoded [default: 40000000]
  table_bytes                Table read ceiling [default: 4 MiB]
  table_rows                 Table row ceiling [default: 1000]

=========================
 Backends
=========================
[object_store]
  endpoint                   S3-compatible endpoint (AWS_ENDPOINT_URL otherwise)
  region                     Region (AWS_REGION otherwise, then us-east-1)
  anonymous                  Do not sign requests (public buckets)

[code_host]
  api_url                    REST API root [default: "https://api.github.com"]
  token_var                  Environment variable holding the token [default: "GITHUB_TOKEN"]

[remote_shell]
  ssh_command                ssh binary [default: "ssh"]
  idle_timeout_secs          Close the shared connection after this idle time [default: 300]
  extra_args                 Extra arguments passed to every ssh call

=========================
 Display Settings
=========================
[display]
  syntax_theme               syntect theme name [default: "base16-ocean.dark"]
  line_numbers               Line numbers in text previews [default: true]
  preview_ratio              Width % of the preview pane (20..=80) [default: 60]
  accent                     Accent color, name or "#RRGGBB" [default: "cyan"]
  status_metadata            Show size/time of the selection in the status line
  render_markdown            Show Markdown files formatted [default: true]
  show_tree                  Show the tree pane at startup [default: true]
"##;

    println!("{}{}", help_text, KEYBINDS_TEXT);
}
