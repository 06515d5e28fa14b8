//! Built-in catalogue of applications and command-line tools

use crate::types::{ApplicationDescriptor, Category};
use chrono::{DateTime, Utc};
use uuid::Uuid;

struct Preset {
    name: &'static str,
    bundle_identifier: &'static str,
    config_paths: &'static [&'static str],
    category: Category,
}

const PRESETS: &[Preset] = &[
    Preset {
        name: "Visual Studio Code",
        bundle_identifier: "com.microsoft.VSCode",
        config_paths: &[
            "~/Library/Application Support/Code/User/settings.json",
            "~/Library/Application Support/Code/User/keybindings.json",
            "~/Library/Application Support/Code/User/snippets",
        ],
        category: Category::Editor,
    },
    Preset {
        name: "Sublime Text",
        bundle_identifier: "com.sublimetext.4",
        config_paths: &["~/Library/Application Support/Sublime Text/Packages/User"],
        category: Category::Editor,
    },
    Preset {
        name: "Zed",
        bundle_identifier: "dev.zed.Zed",
        config_paths: &["~/.config/zed/settings.json", "~/.config/zed/keymap.json"],
        category: Category::Editor,
    },
    Preset {
        name: "iTerm",
        bundle_identifier: "com.googlecode.iterm2",
        config_paths: &["~/Library/Preferences/com.googlecode.iterm2.plist"],
        category: Category::Terminal,
    },
    Preset {
        name: "kitty",
        bundle_identifier: "net.kovidgoyal.kitty",
        config_paths: &["~/.config/kitty"],
        category: Category::Terminal,
    },
    Preset {
        name: "Alacritty",
        bundle_identifier: "org.alacritty",
        config_paths: &["~/.config/alacritty"],
        category: Category::Terminal,
    },
    Preset {
        name: "Rectangle",
        bundle_identifier: "com.knollsoft.Rectangle",
        config_paths: &["~/Library/Preferences/com.knollsoft.Rectangle.plist"],
        category: Category::Utility,
    },
    Preset {
        name: "Zsh",
        bundle_identifier: "cli.zsh",
        config_paths: &["~/.zshrc", "~/.zprofile", "~/.zshenv"],
        category: Category::Shell,
    },
    Preset {
        name: "Bash",
        bundle_identifier: "cli.bash",
        config_paths: &["~/.bashrc", "~/.bash_profile"],
        category: Category::Shell,
    },
    Preset {
        name: "Git",
        bundle_identifier: "cli.git",
        config_paths: &["~/.gitconfig", "~/.gitignore_global"],
        category: Category::Development,
    },
    Preset {
        name: "Vim",
        bundle_identifier: "cli.vim",
        config_paths: &["~/.vimrc", "~/.vim"],
        category: Category::Editor,
    },
    Preset {
        name: "Neovim",
        bundle_identifier: "cli.nvim",
        config_paths: &["~/.config/nvim"],
        category: Category::Editor,
    },
    Preset {
        name: "tmux",
        bundle_identifier: "cli.tmux",
        config_paths: &["~/.tmux.conf"],
        category: Category::Terminal,
    },
    Preset {
        name: "SSH",
        bundle_identifier: "cli.ssh",
        config_paths: &["~/.ssh/config"],
        category: Category::Utility,
    },
];

/// Marker paths of the command-line tools in the catalogue.
///
/// A tool counts as installed when any of its markers exists.
pub const CLI_MARKERS: &[(&str, &[&str])] = &[
    ("cli.zsh", &["/bin/zsh", "/usr/bin/zsh", "~/.zshrc"]),
    ("cli.bash", &["/bin/bash", "/usr/bin/bash"]),
    ("cli.git", &["/usr/bin/git", "/usr/local/bin/git", "/opt/homebrew/bin/git"]),
    ("cli.vim", &["/usr/bin/vim", "/usr/local/bin/vim", "/opt/homebrew/bin/vim"]),
    ("cli.nvim", &["/usr/bin/nvim", "/usr/local/bin/nvim", "/opt/homebrew/bin/nvim"]),
    ("cli.tmux", &["/usr/bin/tmux", "/usr/local/bin/tmux", "/opt/homebrew/bin/tmux"]),
    ("cli.ssh", &["/usr/bin/ssh"]),
];

/// The preset applications, with ids derived from their bundle identifiers
/// so they stay stable across runs.
#[must_use]
pub fn preset_applications() -> Vec<ApplicationDescriptor> {
    let created_at = DateTime::<Utc>::default();
    PRESETS
        .iter()
        .map(|p| ApplicationDescriptor {
            id: preset_id(p.bundle_identifier),
            name: p.name.to_string(),
            bundle_identifier: p.bundle_identifier.to_string(),
            config_paths: p.config_paths.iter().map(|s| (*s).to_string()).collect(),
            category: p.category,
            is_user_defined: false,
            created_at,
            is_installed: false,
            is_selected: false,
        })
        .collect()
}

/// Stable id for a preset identifier
#[must_use]
pub fn preset_id(bundle_identifier: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, bundle_identifier.as_bytes())
}
