//! Built-in command modules.
//!
//! A device names its command module in the configuration file
//! (`commands = "console"`); [`find`] resolves that name to a compiled-in
//! [`CommandModule`].

use crate::application::commands::CommandModule;

pub mod console;

/// Every module shipped with the binary.
pub static BUILTIN: &[&CommandModule] = &[&console::MODULE];

/// Looks up a built-in module by name.
pub fn find(name: &str) -> Option<&'static CommandModule> {
    BUILTIN.iter().copied().find(|m| m.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_resolves_console_module() {
        let module = find("console").expect("console is built in");
        assert_eq!(module.name, "console");
    }

    #[test]
    fn test_find_unknown_module_returns_none() {
        assert!(find("does-not-exist").is_none());
    }

    #[test]
    fn test_builtin_names_are_unique() {
        let mut names: Vec<_> = BUILTIN.iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), BUILTIN.len());
    }
}
