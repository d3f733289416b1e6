//! Utilities for terminal output during scanning.

/// Terminal User Interface Module for ElasticHunt
/// Defines macros to use
#[macro_export]
macro_rules! warning {
    ($name:expr) => {
        println!("{} {}", $crate::tui::ansi_term::Colour::Red.bold().paint("[!]"), $name);
    };
    ($name:expr, $quiet:expr, $accessible:expr) => {
        // if not quiet then print, otherwise no else statement so do not print.
        if !$quiet {
            if $accessible {
                // Don't print the ascii art
                println!("{}", $name);
            } else {
                println!("{} {}", $crate::tui::ansi_term::Colour::Red.bold().paint("[!]"), $name);
            }
        }
    };
}

#[macro_export]
macro_rules! detail {
    ($name:expr) => {
        println!("{} {}", $crate::tui::ansi_term::Colour::Blue.bold().paint("[~]"), $name);
    };
    ($name:expr, $quiet:expr, $accessible:expr) => {
        if !$quiet {
            if $accessible {
                println!("{}", $name);
            } else {
                println!("{} {}", $crate::tui::ansi_term::Colour::Blue.bold().paint("[~]"), $name);
            }
        }
    };
}

#[macro_export]
macro_rules! output {
    ($name:expr) => {
        println!(
            "{} {}",
            $crate::tui::ansi_term::Colour::RGB(0, 255, 9)
                .bold()
                .paint("[>]"),
            $name
        );
    };
    ($name:expr, $quiet:expr, $accessible:expr) => {
        if !$quiet {
            if $accessible {
                println!("{}", $name);
            } else {
                println!(
                    "{} {}",
                    $crate::tui::ansi_term::Colour::RGB(0, 255, 9).bold().paint("[>]"),
                    $name
                );
            }
        }
    };
}

#[doc(hidden)]
pub use ansi_term;

/// Prints the opening banner, unless the user asked for none.
#[cfg(not(tarpaulin_include))]
pub fn print_opening(no_banner: bool, accessible: bool) {
    use colorful::{Color, Colorful};

    if no_banner {
        return;
    }

    let banner = r"
      _           _   _      _                 _
  ___| | __ _ ___| |_(_) ___| |__  _   _ _ __ | |_
 / _ \ |/ _` / __| __| |/ __| '_ \| | | | '_ \| __|
|  __/ | (_| \__ \ |_| | (__| | | | |_| | | | | |_
 \___|_|\__,_|___/\__|_|\___|_| |_|\__,_|_| |_|\__|
";
    if accessible {
        println!("{banner}");
    } else {
        println!("{}", banner.gradient(Color::Yellow).bold());
    }

    let info = r#"
-----------------------------------------------------
: Only touches clusters that answer without auth.   :
: Exported data is not transformed, only projected. :
-----------------------------------------------------
"#;
    if accessible {
        println!("{info}");
    } else {
        println!("{}", info.gradient(Color::Yellow).bold());
    }
}
