//! Static key-binding reference shown in the help overlay.

pub struct KeyBinding {
    pub key: &'static str,
    pub description: &'static str,
}

pub fn get_all_keybindings() -> Vec<KeyBinding> {
    vec![
        KeyBinding { key: "q", description: "Quit" },
        KeyBinding { key: "↑ / k", description: "Select previous process" },
        KeyBinding { key: "↓ / j", description: "Select next process" },
        KeyBinding { key: "s", description: "Cycle sort column" },
        KeyBinding { key: "?", description: "Toggle this help overlay" },
    ]
}

pub fn get_status_bar_keybindings() -> Vec<KeyBinding> {
    vec![
        KeyBinding { key: "q", description: "quit" },
        KeyBinding { key: "s", description: "sort" },
        KeyBinding { key: "?", description: "help" },
    ]
}
