//! Single-flight guard for user-triggered requests.
//!
//! A second trigger of the same action on the same target while the first
//! is in flight is refused rather than queued.

use std::collections::HashSet;

use incident_core::BoardError;

#[derive(Debug, Default)]
pub struct SingleFlight {
    in_flight: HashSet<(String, String)>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_begin(&mut self, action: &str, id: &str) -> Result<(), BoardError> {
        if self.in_flight.insert((action.to_string(), id.to_string())) {
            Ok(())
        } else {
            Err(BoardError::InFlight {
                action: action.to_string(),
                id: id.to_string(),
            })
        }
    }

    pub fn finish(&mut self, action: &str, id: &str) {
        self.in_flight.remove(&(action.to_string(), id.to_string()));
    }

    pub fn is_in_flight(&self, action: &str, id: &str) -> bool {
        self.in_flight
            .contains(&(action.to_string(), id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_begin_is_refused_until_finish() {
        let mut guard = SingleFlight::new();
        assert!(guard.try_begin("diagnosis", "inc-1").is_ok());
        assert!(matches!(
            guard.try_begin("diagnosis", "inc-1"),
            Err(BoardError::InFlight { .. })
        ));
        // Other actions and targets are independent.
        assert!(guard.try_begin("solution", "inc-1").is_ok());
        assert!(guard.try_begin("diagnosis", "inc-2").is_ok());

        guard.finish("diagnosis", "inc-1");
        assert!(!guard.is_in_flight("diagnosis", "inc-1"));
        assert!(guard.try_begin("diagnosis", "inc-1").is_ok());
        assert_eq!(guard.len(), 3);
    }
}
