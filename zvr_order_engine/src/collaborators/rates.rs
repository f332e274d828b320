use std::collections::HashMap;

use log::*;

use crate::db_types::Rupiah;

/// Flat shipping rates used at checkout when the shipping gateway cannot quote. Keys are lower-case
/// `(courier, service)` pairs; a `None` service is the courier-wide default.
#[derive(Debug, Clone)]
pub struct StaticRateFallback {
    rates: HashMap<(String, Option<String>), Rupiah>,
}

impl Default for StaticRateFallback {
    fn default() -> Self {
        let mut fallback = Self::empty();
        fallback
            .with_rate("jne", Some("reg"), 15_000)
            .with_rate("jne", Some("yes"), 28_000)
            .with_rate("jne", None, 15_000)
            .with_rate("jnt", None, 14_000)
            .with_rate("sicepat", Some("reg"), 13_000)
            .with_rate("sicepat", None, 13_000)
            .with_rate("pos", None, 12_000)
            .with_rate("anteraja", None, 14_000);
        fallback
    }
}

impl StaticRateFallback {
    pub fn empty() -> Self {
        Self { rates: HashMap::new() }
    }

    pub fn with_rate(&mut self, courier: &str, service: Option<&str>, rate: i64) -> &mut Self {
        let key = (courier.to_lowercase(), service.map(|s| s.to_lowercase()));
        self.rates.insert(key, Rupiah::from(rate));
        self
    }

    /// The flat rate for the courier and service, falling back to the courier-wide rate.
    pub fn rate(&self, courier: &str, service: Option<&str>) -> Option<Rupiah> {
        let courier = courier.to_lowercase();
        let specific = service.and_then(|s| self.rates.get(&(courier.clone(), Some(s.to_lowercase()))));
        let rate = specific.or_else(|| self.rates.get(&(courier.clone(), None))).copied();
        if rate.is_none() {
            warn!("🚚️ No fallback shipping rate for {courier}/{}", service.unwrap_or("-"));
        }
        rate
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn service_then_courier_default() {
        let rates = StaticRateFallback::default();
        assert_eq!(rates.rate("JNE", Some("YES")), Some(Rupiah::from(28_000)));
        assert_eq!(rates.rate("jne", Some("oke")), Some(Rupiah::from(15_000)));
        assert_eq!(rates.rate("jnt", None), Some(Rupiah::from(14_000)));
        assert_eq!(rates.rate("gosend", Some("instant")), None);
    }
}
