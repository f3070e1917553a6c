//! `console`: commands for a device whose shell is on a node named
//! `console`.

use crate::application::commands::{CommandModule, Registrar};
use crate::error::BridgeError;

/// Node every command in this module writes to.
pub const CONSOLE_NODE: &str = "console";

/// ASCII ETX, what a terminal sends for Ctrl-C.
const INTERRUPT: &str = "\x03";

pub static MODULE: CommandModule = CommandModule {
    name: "console",
    register,
};

fn register(r: &mut Registrar) -> Result<(), BridgeError> {
    r.add("reboot", Some("power"), |api| {
        api.sendln(CONSOLE_NODE, "reboot")?;
        Ok(())
    })?;
    r.add("break", Some("stop"), |api| {
        api.send(CONSOLE_NODE, INTERRUPT)?;
        Ok(())
    })?;
    r.divider();
    r.add("status", Some("info"), |api| {
        api.sendln(CONSOLE_NODE, "")?;
        api.sendln(CONSOLE_NODE, "uptime")?;
        Ok(())
    })?;
    Ok(())
}
