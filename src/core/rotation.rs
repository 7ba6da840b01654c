use std::collections::VecDeque;

/// Ring of audit endpoints; each call hands out the front and moves it to the back.
#[derive(Debug, Clone)]
pub struct EndpointRotation {
    endpoints: VecDeque<String>,
}

impl EndpointRotation {
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
        }
    }

    pub fn next_endpoint(&mut self) -> Option<String> {
        let endpoint = self.endpoints.pop_front()?;
        self.endpoints.push_back(endpoint.clone());
        Some(endpoint)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_covers_each_endpoint_once_per_lap() {
        let mut rotation = EndpointRotation::new(["a", "b", "c"]);

        let first_lap: Vec<_> = (0..3).filter_map(|_| rotation.next_endpoint()).collect();
        let second_lap: Vec<_> = (0..3).filter_map(|_| rotation.next_endpoint()).collect();

        assert_eq!(first_lap, vec!["a", "b", "c"]);
        assert_eq!(second_lap, first_lap);
        assert_eq!(rotation.len(), 3);
    }

    #[test]
    fn test_empty_rotation_yields_nothing() {
        let mut rotation = EndpointRotation::new(Vec::<String>::new());
        assert!(rotation.is_empty());
        assert_eq!(rotation.next_endpoint(), None);
    }
}
