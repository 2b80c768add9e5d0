use std::fmt;
use std::str::FromStr;

/// The throttle rates in force when an event was throttled.
///
/// The compact text form `t:<org>:<project>` keeps cached rejections small.
/// A bare `t` is read as both rates disabled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ThrottleState {
    pub organization_rate: u8,
    pub project_rate: u8,
}

impl ThrottleState {
    pub fn new(organization_rate: u8, project_rate: u8) -> Self {
        ThrottleState {
            organization_rate,
            project_rate,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split(':');
        if parts.next() != Some("t") {
            return None;
        }
        match (parts.next(), parts.next(), parts.next()) {
            (None, None, None) => Some(ThrottleState::default()),
            (Some(org), Some(project), None) => Some(ThrottleState {
                organization_rate: org.parse().ok()?,
                project_rate: project.parse().ok()?,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for ThrottleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t:{}:{}", self.organization_rate, self.project_rate)
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("invalid throttle state: {0:?}")]
pub struct InvalidThrottleState(pub String);

impl FromStr for ThrottleState {
    type Err = InvalidThrottleState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ThrottleState::parse(s).ok_or_else(|| InvalidThrottleState(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        assert_eq!(ThrottleState::new(30, 0).to_string(), "t:30:0");
        assert_eq!(ThrottleState::default().to_string(), "t:0:0");
    }

    #[test]
    fn test_parse() {
        assert_eq!(ThrottleState::parse("t:30:0"), Some(ThrottleState::new(30, 0)));
        assert_eq!(ThrottleState::parse("t"), Some(ThrottleState::new(0, 0)));
        assert_eq!("t:5:100".parse(), Ok(ThrottleState::new(5, 100)));

        for bad in ["", "v", "t:", "t:1", "t:1:2:3", "x:1:2", "t:a:1", "t:1:300"] {
            assert_eq!(ThrottleState::parse(bad), None, "{bad}");
        }
        assert!("v".parse::<ThrottleState>().is_err());
    }
}
