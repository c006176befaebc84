//! Defines the `WeatherField` enum, naming the IMS channels a kit's metadata row
//! can be enriched with.

use std::fmt;

/// A weather channel reported by the IMS "envista" network.
///
/// The [`name`](WeatherField::name) doubles as the metadata column header and as the
/// channel name in provider responses; both are matched case-sensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WeatherField {
    /// Dry temperature (°C).
    Td,
    /// Minimum temperature (°C).
    TdMin,
    /// Maximum temperature (°C).
    TdMax,
    /// Ground temperature (°C).
    Tg,
    /// Maximum wind speed (m/s).
    WsMax,
    /// Direction of the maximum wind gust (deg).
    WdMax,
    /// Wind speed (m/s).
    Ws,
    /// Wind direction (deg).
    Wd,
    /// Standard deviation of the wind direction (deg).
    StdWd,
    /// Global radiation (W/m²).
    Grad,
    /// Direct normal irradiance (W/m²).
    Nip,
    /// Diffuse radiation (W/m²).
    DiffR,
    /// Relative humidity (%).
    Rh,
    /// Rainfall (mm).
    Rain,
}

impl WeatherField {
    /// Number of weather channels.
    pub const COUNT: usize = 14;

    /// All fields in metadata column order.
    pub const ALL: [WeatherField; WeatherField::COUNT] = [
        WeatherField::Td,
        WeatherField::TdMin,
        WeatherField::TdMax,
        WeatherField::Tg,
        WeatherField::WsMax,
        WeatherField::WdMax,
        WeatherField::Ws,
        WeatherField::Wd,
        WeatherField::StdWd,
        WeatherField::Grad,
        WeatherField::Nip,
        WeatherField::DiffR,
        WeatherField::Rh,
        WeatherField::Rain,
    ];

    /// Column index at which the first field is inserted when a metadata
    /// table has none of the weather columns yet.
    pub const FIRST_COLUMN_POSITION: usize = 7;

    pub fn name(&self) -> &'static str {
        match self {
            WeatherField::Td => "TD",
            WeatherField::TdMin => "TDmin",
            WeatherField::TdMax => "TDmax",
            WeatherField::Tg => "TG",
            WeatherField::WsMax => "WSmax",
            WeatherField::WdMax => "WDmax",
            WeatherField::Ws => "WS",
            WeatherField::Wd => "WD",
            WeatherField::StdWd => "STDwd",
            WeatherField::Grad => "Grad",
            WeatherField::Nip => "NIP",
            WeatherField::DiffR => "DiffR",
            WeatherField::Rh => "RH",
            WeatherField::Rain => "Rain",
        }
    }

    /// Exact, case-sensitive lookup of a provider channel name.
    ///
    /// # Examples
    ///
    /// ```
    /// use kit_data_merger::WeatherField;
    ///
    /// assert_eq!(WeatherField::from_name("STDwd"), Some(WeatherField::StdWd));
    /// assert_eq!(WeatherField::from_name("stdwd"), None);
    /// ```
    pub fn from_name(name: &str) -> Option<WeatherField> {
        WeatherField::ALL.into_iter().find(|field| field.name() == name)
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for WeatherField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
