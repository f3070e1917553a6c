//! Scripted commands.
//!
//! A command module is a compiled-in [`CommandModule`]: a name plus a
//! `register` function that adds handlers to a [`Registrar`].  Registration
//! order is display order, and [`Registrar::divider`] inserts a visual
//! separator (the reserved name [`DIVIDER`]).
//!
//! ```rust
//! use serial_bridge::application::commands::{CommandModule, Registrar};
//! use serial_bridge::BridgeError;
//!
//! fn register(r: &mut Registrar) -> Result<(), BridgeError> {
//!     r.add("reset", Some("refresh"), |api| {
//!         api.sendln("console", "reset")?;
//!         Ok(())
//!     })?;
//!     r.divider();
//!     Ok(())
//! }
//!
//! static DEMO: CommandModule = CommandModule { name: "doc-demo", register };
//! # let _ = &DEMO;
//! ```
//!
//! # Load cache
//!
//! Each module is registered at most once per process.  The first
//! [`Commands::load`] runs `register` and validates the result while holding
//! the cache lock, so concurrent first loads cannot register twice; later
//! loads share the cached table.  A module whose registration fails is not
//! cached.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tracing::debug;

use crate::application::lock;
use crate::application::node::Node;
use crate::error::BridgeError;

/// Reserved command name marking a divider.
pub const DIVIDER: &str = "-";

/// A command handler.
pub type Handler = Arc<dyn Fn(&CommandApi<'_>) -> anyhow::Result<()> + Send + Sync>;

/// A compiled-in set of commands.
#[derive(Clone, Copy)]
pub struct CommandModule {
    /// Identity of the module; the load cache is keyed by it.
    pub name: &'static str,
    pub register: fn(&mut Registrar) -> Result<(), BridgeError>,
}

impl fmt::Debug for CommandModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandModule")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// One entry of a command list, as shown to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEntry {
    pub name: String,
    /// Display icon; always `None` for dividers.
    pub icon: Option<String>,
}

impl CommandEntry {
    pub fn is_divider(&self) -> bool {
        self.name == DIVIDER
    }
}

/// Collects a module's commands during registration.
pub struct Registrar {
    module: &'static str,
    entries: Vec<CommandEntry>,
    handlers: HashMap<String, Handler>,
}

impl Registrar {
    fn new(module: &'static str) -> Self {
        Self {
            module,
            entries: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    /// Adds a command.
    ///
    /// # Errors
    ///
    /// [`BridgeError::ReservedName`] if `name` is the divider sentinel,
    /// [`BridgeError::DuplicateCommand`] if `name` was already added, and
    /// [`BridgeError::InvalidConfig`] if `name` is empty.
    pub fn add<F>(&mut self, name: &str, icon: Option<&str>, handler: F) -> Result<(), BridgeError>
    where
        F: Fn(&CommandApi<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        if name == DIVIDER {
            return Err(BridgeError::ReservedName(name.to_string()));
        }
        if name.is_empty() {
            return Err(BridgeError::InvalidConfig(format!(
                "module {} registered a command with an empty name",
                self.module
            )));
        }
        if self.handlers.contains_key(name) {
            return Err(BridgeError::DuplicateCommand(name.to_string()));
        }

        self.entries.push(CommandEntry {
            name: name.to_string(),
            icon: icon.map(str::to_string),
        });
        self.handlers.insert(name.to_string(), Arc::new(handler));
        Ok(())
    }

    /// Appends a divider.
    pub fn divider(&mut self) {
        self.entries.push(CommandEntry {
            name: DIVIDER.to_string(),
            icon: None,
        });
    }
}

/// The validated, immutable result of registering one module.
struct CommandTable {
    entries: Vec<CommandEntry>,
    names: Vec<String>,
    handlers: HashMap<String, Handler>,
}

static LOADED: Lazy<Mutex<HashMap<&'static str, Arc<CommandTable>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// A device's command registry.
#[derive(Clone)]
pub struct Commands {
    module: &'static str,
    table: Arc<CommandTable>,
}

impl Commands {
    /// Loads `module`, registering it on first use and reusing the cached
    /// table afterwards.
    ///
    /// # Errors
    ///
    /// Any error returned by the module's `register` function, including
    /// [`BridgeError::DuplicateCommand`] and [`BridgeError::ReservedName`].
    pub fn load(module: &CommandModule) -> Result<Self, BridgeError> {
        let mut loaded = lock(&*LOADED);
        if let Some(table) = loaded.get(module.name) {
            debug!("command module {} served from cache", module.name);
            return Ok(Self {
                module: module.name,
                table: Arc::clone(table),
            });
        }

        let mut registrar = Registrar::new(module.name);
        (module.register)(&mut registrar)?;

        let table = Arc::new(CommandTable {
            names: registrar.entries.iter().map(|e| e.name.clone()).collect(),
            entries: registrar.entries,
            handlers: registrar.handlers,
        });
        debug!(
            "command module {} loaded with {} command(s)",
            module.name,
            table.handlers.len()
        );
        loaded.insert(module.name, Arc::clone(&table));
        Ok(Self {
            module: module.name,
            table,
        })
    }

    pub fn module(&self) -> &'static str {
        self.module
    }

    /// Ordered command identifiers, dividers included.
    pub fn command_list(&self) -> &[String] {
        &self.table.names
    }

    /// Ordered `(name, icon)` entries, dividers included.
    pub fn iter(&self) -> impl Iterator<Item = &CommandEntry> + '_ {
        self.table.entries.iter()
    }

    /// Returns `true` if `name` is a runnable command.  Never true for the
    /// divider.
    pub fn contains(&self, name: &str) -> bool {
        self.table.handlers.contains_key(name)
    }

    /// Returns `true` if both registries share one loaded table.
    pub fn shares_table_with(&self, other: &Commands) -> bool {
        Arc::ptr_eq(&self.table, &other.table)
    }

    /// Runs `name` on the caller's thread with an API bound to `nodes`.
    ///
    /// The handler may address any node in `nodes` by name; deciding which
    /// nodes a command may touch is the caller's job.
    ///
    /// # Errors
    ///
    /// [`BridgeError::UnknownCommand`] if `name` is not registered (no
    /// handler runs).  A handler error that is a `BridgeError` is returned
    /// as is; any other handler error is wrapped in
    /// [`BridgeError::Command`].
    pub fn run(&self, name: &str, nodes: &[Arc<Node>]) -> Result<(), BridgeError> {
        let handler = self
            .table
            .handlers
            .get(name)
            .ok_or_else(|| BridgeError::UnknownCommand(name.to_string()))?;

        debug!("running command {name} from module {}", self.module);
        let api = CommandApi { nodes };
        handler(&api).map_err(|e| match e.downcast::<BridgeError>() {
            Ok(bridge) => bridge,
            Err(other) => BridgeError::Command(other),
        })
    }
}

impl fmt::Debug for Commands {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Commands")
            .field("module", &self.module)
            .field("commands", &self.table.names)
            .finish()
    }
}

/// The only operations a command handler can perform.
pub struct CommandApi<'a> {
    nodes: &'a [Arc<Node>],
}

impl CommandApi<'_> {
    /// Writes `text` to the named node, tagged as a `web` write.
    ///
    /// # Errors
    ///
    /// [`BridgeError::UnknownNode`] if no supplied node has that name.
    pub fn send(&self, node: &str, text: &str) -> Result<(), BridgeError> {
        let target = self
            .nodes
            .iter()
            .find(|n| n.name() == node)
            .ok_or_else(|| BridgeError::UnknownNode(node.to_string()))?;
        target.web_to_serial(text.as_bytes())
    }

    /// Like [`send`](Self::send) with `"\r\n"` appended.
    pub fn sendln(&self, node: &str, text: &str) -> Result<(), BridgeError> {
        self.send(node, &format!("{text}\r\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::node::{NodeSettings, NullObserver};
    use crate::infrastructure::serial::MockPortOpener;
    use bridge_core::{ErrorKind, SerialConfig};

    fn greet(r: &mut Registrar) -> Result<(), BridgeError> {
        r.add("hello", Some("wave"), |api| {
            api.sendln("uart", "hello")?;
            Ok(())
        })?;
        r.divider();
        r.add("quiet", None, |api| {
            api.send("uart", "q")?;
            Ok(())
        })
    }

    static GREET: CommandModule = CommandModule {
        name: "commands-unit-greet",
        register: greet,
    };

    #[test]
    fn test_registrar_rejects_divider_name() {
        let mut r = Registrar::new("t");
        let err = r.add(DIVIDER, None, |_| Ok(())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReservedName);
    }

    #[test]
    fn test_registrar_rejects_duplicate_name() {
        let mut r = Registrar::new("t");
        r.add("foo", None, |_| Ok(())).unwrap();
        let err = r.add("foo", Some("x"), |_| Ok(())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateCommand);
    }

    #[test]
    fn test_iteration_preserves_order_and_divider_has_no_icon() {
        let commands = Commands::load(&GREET).unwrap();

        let entries: Vec<(String, Option<String>)> = commands
            .iter()
            .map(|e| (e.name.clone(), e.icon.clone()))
            .collect();

        assert_eq!(
            entries,
            vec![
                ("hello".to_string(), Some("wave".to_string())),
                ("-".to_string(), None),
                ("quiet".to_string(), None),
            ]
        );
        assert_eq!(commands.command_list(), ["hello", "-", "quiet"]);
    }

    #[test]
    fn test_contains_never_matches_divider() {
        let commands = Commands::load(&GREET).unwrap();
        assert!(commands.contains("hello"));
        assert!(!commands.contains(DIVIDER));
    }

    #[test]
    fn test_run_sends_through_named_node() {
        // Arrange
        let opener = Arc::new(MockPortOpener::new());
        let node = Arc::new(
            Node::new(
                NodeSettings::new("uart", SerialConfig::new("COM1", 9600)),
                opener.clone(),
                Arc::new(NullObserver),
            )
            .unwrap(),
        );
        node.connect().unwrap();
        let commands = Commands::load(&GREET).unwrap();

        // Act
        commands.run("hello", &[node]).unwrap();

        // Assert
        assert_eq!(opener.handle("COM1").written(), b"hello\r\n");
    }

    #[test]
    fn test_send_to_unknown_node_surfaces_unknown_node() {
        let commands = Commands::load(&GREET).unwrap();

        let err = commands.run("quiet", &[]).unwrap_err();

        assert!(matches!(err, BridgeError::UnknownNode(ref n) if n == "uart"));
    }
}
