use std::fmt;

/// Parsed form of a torch target address.
///
/// Wire format is `valley:<name>` or `valley:<name>/campfire:<name>`.
/// Parsing is tolerant of extra segments and never panics; anything that
/// does not name a valley resolves to no destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorchAddress {
    pub valley: String,
    pub campfire: Option<String>,
}

impl TorchAddress {
    pub fn valley(name: impl Into<String>) -> Self {
        Self {
            valley: name.into(),
            campfire: None,
        }
    }

    pub fn campfire(valley: impl Into<String>, campfire: impl Into<String>) -> Self {
        Self {
            valley: valley.into(),
            campfire: Some(campfire.into()),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let mut valley = None;
        let mut campfire = None;

        for segment in raw.split('/') {
            let Some((scheme, name)) = segment.split_once(':') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            match scheme.trim() {
                "valley" if valley.is_none() => valley = Some(name.to_string()),
                "campfire" if campfire.is_none() => campfire = Some(name.to_string()),
                _ => {}
            }
        }

        Some(Self {
            valley: valley?,
            campfire,
        })
    }

    /// Broker channel a torch addressed here is delivered on. Campfire
    /// addresses map onto the campfire's direct channel.
    pub fn channel(&self) -> String {
        match &self.campfire {
            Some(campfire) => format!("campfire:{campfire}"),
            None => format!("valley:{}", self.valley),
        }
    }
}

impl fmt::Display for TorchAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.campfire {
            Some(campfire) => write!(f, "valley:{}/campfire:{}", self.valley, campfire),
            None => write!(f, "valley:{}", self.valley),
        }
    }
}
