use serde::{Deserialize, Serialize};
use std::fmt;

/// Win32 virtual-key code of a keyboard key or mouse button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "KeyRepr", into = "String")]
pub struct VirtualKey(pub u16);

impl VirtualKey {
    pub const LBUTTON: Self = Self(0x01);
    pub const RBUTTON: Self = Self(0x02);
    pub const MBUTTON: Self = Self(0x04);
    pub const XBUTTON1: Self = Self(0x05);
    pub const XBUTTON2: Self = Self(0x06);
    pub const SHIFT: Self = Self(0x10);
    pub const CONTROL: Self = Self(0x11);
    pub const MENU: Self = Self(0x12);
    pub const ESCAPE: Self = Self(0x1B);
    pub const END: Self = Self(0x23);
    pub const HOME: Self = Self(0x24);
    pub const UP: Self = Self(0x26);
    pub const DOWN: Self = Self(0x28);

    /// Accepts any code in the Win32 virtual-key range (1..=254).
    pub fn from_code(code: i32) -> Option<Self> {
        if (1..=0xFE).contains(&code) {
            Some(Self(code as u16))
        } else {
            None
        }
    }

    pub fn name(self) -> String {
        key_name(self.0)
    }
}

impl fmt::Display for VirtualKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl From<VirtualKey> for String {
    fn from(key: VirtualKey) -> Self {
        key.name()
    }
}

/// Keys in config files may be written as raw codes or as display names.
#[derive(Deserialize)]
#[serde(untagged)]
enum KeyRepr {
    Code(u16),
    Name(String),
}

impl TryFrom<KeyRepr> for VirtualKey {
    type Error = String;

    fn try_from(repr: KeyRepr) -> Result<Self, Self::Error> {
        match repr {
            KeyRepr::Code(code) => {
                VirtualKey::from_code(code as i32).ok_or_else(|| format!("invalid key code {code}"))
            }
            KeyRepr::Name(name) => {
                parse_key(&name.trim().to_ascii_uppercase())
                    .ok_or_else(|| format!("unknown key '{name}'"))
            }
        }
    }
}

const NAMED_KEYS: &[(u16, &str)] = &[
    (0x01, "LMB"),
    (0x02, "RMB"),
    (0x04, "MMB"),
    (0x05, "Mouse 4"),
    (0x06, "Mouse 5"),
    (0x08, "Backspace"),
    (0x09, "Tab"),
    (0x0D, "Enter"),
    (0x10, "Shift"),
    (0x11, "Ctrl"),
    (0x12, "Alt"),
    (0x13, "Pause"),
    (0x14, "Caps Lock"),
    (0x1B, "Esc"),
    (0x20, "Space"),
    (0x21, "Page Up"),
    (0x22, "Page Down"),
    (0x23, "End"),
    (0x24, "Home"),
    (0x25, "Left"),
    (0x26, "Up"),
    (0x27, "Right"),
    (0x28, "Down"),
    (0x2C, "Print Screen"),
    (0x2D, "Insert"),
    (0x2E, "Delete"),
    (0x5B, "Win"),
    (0x5D, "Menu"),
    (0x90, "Num Lock"),
    (0x91, "Scroll Lock"),
];

/// Human readable name for a virtual-key code, e.g. `0x26` -> `"Up"`.
pub fn key_name(code: u16) -> String {
    if let Some((_, name)) = NAMED_KEYS.iter().find(|(c, _)| *c == code) {
        return (*name).to_string();
    }
    match code {
        0x30..=0x39 | 0x41..=0x5A => char::from(code as u8).to_string(),
        0x70..=0x87 => format!("F{}", code - 0x6F),
        _ => format!("Key {code}"),
    }
}

fn parse_key(upper: &str) -> Option<VirtualKey> {
    if let Some((code, _)) = NAMED_KEYS
        .iter()
        .find(|(_, name)| name.to_ascii_uppercase() == upper)
    {
        return Some(VirtualKey(*code));
    }
    let code = match upper {
        "CONTROL" => 0x11,
        "ESCAPE" => 0x1B,
        "RETURN" => 0x0D,
        "PAGEUP" | "PGUP" => 0x21,
        "PAGEDOWN" | "PGDN" => 0x22,
        "UPARROW" => 0x26,
        "DOWNARROW" => 0x28,
        "LEFTARROW" => 0x25,
        "RIGHTARROW" => 0x27,
        "MOUSE4" | "XBUTTON1" => 0x05,
        "MOUSE5" | "XBUTTON2" => 0x06,
        _ if upper.starts_with("0X") => {
            return u16::from_str_radix(&upper[2..], 16)
                .ok()
                .and_then(|c| VirtualKey::from_code(c as i32))
        }
        _ if upper.starts_with("KEY ") => {
            return upper[4..].trim().parse::<i32>().ok().and_then(VirtualKey::from_code)
        }
        _ if upper.len() > 1 && upper.starts_with('F') => match upper[1..].parse::<u16>().ok() {
            Some(n @ 1..=24) => 0x6F + n,
            _ => return None,
        },
        _ if upper.len() == 1 => {
            let c = upper.chars().next()?;
            if c.is_ascii_digit() || c.is_ascii_uppercase() {
                c as u16
            } else {
                return None;
            }
        }
        _ => return None,
    };
    Some(VirtualKey(code))
}

/// Modifier keys that must be held for a binding to fire.
///
/// Matching is "required implies held": a flag set here must be down, a flag
/// left unset is ignored rather than required to be released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        ctrl: false,
        shift: false,
        alt: false,
    };

    pub const CTRL: Self = Self {
        ctrl: true,
        shift: false,
        alt: false,
    };

    pub fn satisfied_by(self, held: Modifiers) -> bool {
        (!self.ctrl || held.ctrl) && (!self.shift || held.shift) && (!self.alt || held.alt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "HotkeyRepr", into = "String")]
pub struct Hotkey {
    pub key: VirtualKey,
    pub modifiers: Modifiers,
}

impl Hotkey {
    pub fn new(key: VirtualKey, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.ctrl {
            f.write_str("Ctrl+")?;
        }
        if self.modifiers.shift {
            f.write_str("Shift+")?;
        }
        if self.modifiers.alt {
            f.write_str("Alt+")?;
        }
        write!(f, "{}", self.key)
    }
}

impl From<Hotkey> for String {
    fn from(hotkey: Hotkey) -> Self {
        hotkey.to_string()
    }
}

/// Hotkeys in config files: `"Ctrl+Up"`, a bare key code, or
/// `{ "key": .., "modifiers": {..} }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum HotkeyRepr {
    Code(u16),
    Name(String),
    Full {
        key: VirtualKey,
        #[serde(default)]
        modifiers: Modifiers,
    },
}

impl TryFrom<HotkeyRepr> for Hotkey {
    type Error = String;

    fn try_from(repr: HotkeyRepr) -> Result<Self, Self::Error> {
        match repr {
            HotkeyRepr::Code(code) => VirtualKey::from_code(code as i32)
                .map(|key| Hotkey::new(key, Modifiers::NONE))
                .ok_or_else(|| format!("invalid key code {code}")),
            HotkeyRepr::Name(value) => {
                parse_hotkey(&value).ok_or_else(|| format!("invalid hotkey '{value}'"))
            }
            HotkeyRepr::Full { key, modifiers } => Ok(Hotkey::new(key, modifiers)),
        }
    }
}

/// Parse a hotkey string like "Ctrl+Shift+Up" into a [`Hotkey`].
///
/// The last segment is always the primary key, so a modifier key can itself
/// be bound (`"Ctrl+Shift"` is Shift with Ctrl held).
pub fn parse_hotkey(s: &str) -> Option<Hotkey> {
    let mut parts = s.split('+').map(|part| part.trim().to_ascii_uppercase());
    let key = parse_key(&parts.next_back()?)?;

    let mut modifiers = Modifiers::NONE;
    for part in parts {
        match part.as_str() {
            "CTRL" | "CONTROL" => modifiers.ctrl = true,
            "SHIFT" => modifiers.shift = true,
            "ALT" => modifiers.alt = true,
            _ => return None,
        }
    }

    Some(Hotkey { key, modifiers })
}
