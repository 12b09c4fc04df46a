// Keyboard shortcut table
// Maps (modifier mask, keysym) pairs to board actions

use bitflags::bitflags;
use smithay_client_toolkit::seat::keyboard::{Keysym, Modifiers};

bitflags! {
    /// Keyboard modifier state, one bit per modifier.
    ///
    /// Deserializes from flag names joined by `|`, e.g. `"CONTROL | MOD2"`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Deserialize)]
    pub struct ModMask: u32 {
        const SHIFT = 1;
        const LOCK = 1 << 1;
        const CONTROL = 1 << 2;
        /// Alt
        const MOD1 = 1 << 3;
        /// Num Lock
        const MOD2 = 1 << 4;
        /// Logo / Super
        const MOD4 = 1 << 6;
    }
}

impl From<&Modifiers> for ModMask {
    fn from(modifiers: &Modifiers) -> Self {
        let mut mask = ModMask::empty();
        mask.set(ModMask::SHIFT, modifiers.shift);
        mask.set(ModMask::LOCK, modifiers.caps_lock);
        mask.set(ModMask::CONTROL, modifiers.ctrl);
        mask.set(ModMask::MOD1, modifiers.alt);
        mask.set(ModMask::MOD2, modifiers.num_lock);
        mask.set(ModMask::MOD4, modifiers.logo);
        mask
    }
}

/// Modifier requirement of a shortcut
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModMatch {
    /// Matches any modifier state
    Any,
    /// The state, minus ignored modifiers, must equal this mask
    Exact(ModMask),
}

impl ModMatch {
    pub fn matches(self, state: ModMask, ignore: ModMask) -> bool {
        match self {
            ModMatch::Any => true,
            ModMatch::Exact(mask) => mask == state.difference(ignore),
        }
    }
}

/// Actions that can be bound to keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardAction {
    ZoomReset,
    SaveBoard,
    ToggleShape,
    Quit,
}

#[derive(Debug, Clone, Copy)]
pub struct Shortcut {
    pub mods: ModMatch,
    pub key: Keysym,
    pub action: BoardAction,
}

impl Shortcut {
    const fn new(mods: ModMatch, key: Keysym, action: BoardAction) -> Self {
        Self { mods, key, action }
    }
}

/// The default bindings
pub fn default_shortcuts() -> Vec<Shortcut> {
    use BoardAction::*;
    vec![
        Shortcut::new(ModMatch::Any, Keysym::_0, ZoomReset),
        Shortcut::new(ModMatch::Any, Keysym::KP_0, ZoomReset),
        Shortcut::new(ModMatch::Any, Keysym::Home, ZoomReset),
        Shortcut::new(ModMatch::Any, Keysym::S, SaveBoard),
        Shortcut::new(ModMatch::Any, Keysym::B, ToggleShape),
        Shortcut::new(ModMatch::Any, Keysym::Escape, Quit),
        Shortcut::new(ModMatch::Any, Keysym::Q, Quit),
    ]
}

/// Fold Latin letters to their shifted keysym so bindings ignore case
fn shifted(key: Keysym) -> Keysym {
    let raw = key.raw();
    if (Keysym::a.raw()..=Keysym::z.raw()).contains(&raw) {
        Keysym::new(raw - (Keysym::a.raw() - Keysym::A.raw()))
    } else {
        key
    }
}

/// Find the first binding matching a key press
pub fn lookup(
    shortcuts: &[Shortcut],
    key: Keysym,
    state: ModMask,
    ignore: ModMask,
) -> Option<BoardAction> {
    let key = shifted(key);
    shortcuts
        .iter()
        .find(|s| shifted(s.key) == key && s.mods.matches(state, ignore))
        .map(|s| s.action)
}
