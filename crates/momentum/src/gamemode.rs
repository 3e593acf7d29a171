//! Gamemodes that take part in global ranking.

use std::ops::{Index, IndexMut};
use std::str::FromStr;

/// A ranked gamemode.
///
/// The discriminants are the codes used by the database. Gamemodes that are not listed here do
/// not have global ranks.
#[repr(u8)]
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Gamemode {
    #[display("SURF")]
    Surf = 1,

    #[display("BHOP")]
    Bhop = 2,

    #[display("RJ")]
    RocketJump = 4,

    #[display("SJ")]
    StickyJump = 5,

    #[display("AHOP")]
    Ahop = 7,

    #[display("CONC")]
    Conc = 9,

    #[display("DEFRAG_CPM")]
    DefragCpm = 10,

    #[display("DEFRAG_VQ3")]
    DefragVq3 = 11,
}

#[derive(Debug, Display, Error)]
#[display("`{code}` is not a ranked gamemode")]
pub struct UnknownGamemodeCode {
    pub code: i32,
}

#[derive(Debug, Display, Error)]
#[display("unknown gamemode `{name}`")]
pub struct UnknownGamemodeName {
    pub name: String,
}

impl Gamemode {
    /// Every ranked gamemode, in ascending code order.
    pub const ALL: [Self; 8] = [
        Self::Surf,
        Self::Bhop,
        Self::RocketJump,
        Self::StickyJump,
        Self::Ahop,
        Self::Conc,
        Self::DefragCpm,
        Self::DefragVq3,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// The code used by the database.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Position of this gamemode in [`Gamemode::ALL`].
    pub const fn index(self) -> usize {
        match self {
            Self::Surf => 0,
            Self::Bhop => 1,
            Self::RocketJump => 2,
            Self::StickyJump => 3,
            Self::Ahop => 4,
            Self::Conc => 5,
            Self::DefragCpm => 6,
            Self::DefragVq3 => 7,
        }
    }
}

impl TryFrom<i32> for Gamemode {
    type Error = UnknownGamemodeCode;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|mode| i32::from(mode.code()) == code)
            .ok_or(UnknownGamemodeCode { code })
    }
}

impl FromStr for Gamemode {
    type Err = UnknownGamemodeName;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.to_string().eq_ignore_ascii_case(value))
            .ok_or_else(|| UnknownGamemodeName { name: value.to_owned() })
    }
}

impl<'de> serde::Deserialize<'de> for Gamemode {
    /// Accepts either the database code or the name.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum CodeOrName {
            Code(i32),
            Name(String),
        }

        match CodeOrName::deserialize(deserializer)? {
            CodeOrName::Code(code) => Self::try_from(code).map_err(serde::de::Error::custom),
            CodeOrName::Name(name) => name.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// One value per [`Gamemode`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModeMap<T>([T; Gamemode::COUNT]);

impl<T> ModeMap<T> {
    pub fn from_fn(mut f: impl FnMut(Gamemode) -> T) -> Self {
        Self(Gamemode::ALL.map(|mode| f(mode)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Gamemode, &T)> {
        Gamemode::ALL.into_iter().zip(&self.0)
    }
}

impl<T> Index<Gamemode> for ModeMap<T> {
    type Output = T;

    fn index(&self, mode: Gamemode) -> &Self::Output {
        &self.0[mode.index()]
    }
}

impl<T> IndexMut<Gamemode> for ModeMap<T> {
    fn index_mut(&mut self, mode: Gamemode) -> &mut Self::Output {
        &mut self.0[mode.index()]
    }
}
