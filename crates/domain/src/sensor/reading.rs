use serde::{Deserialize, Serialize};

/// One labeled value, e.g. `"T [°C]" = 21.5`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub label: String,
    pub value: f64,
}

/// Ordered mapping of measurement label to value, in the order the driver
/// produced them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reading {
    measurements: Vec<Measurement>,
}

impl Reading {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a value; a new label goes last
    pub fn insert(&mut self, label: impl Into<String>, value: f64) {
        let label = label.into();
        match self.measurements.iter_mut().find(|m| m.label == label) {
            Some(existing) => existing.value = value,
            None => self.measurements.push(Measurement { label, value }),
        }
    }

    pub fn with(mut self, label: impl Into<String>, value: f64) -> Self {
        self.insert(label, value);
        self
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.measurements
            .iter()
            .find(|m| m.label == label)
            .map(|m| m.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Measurement> {
        self.measurements.iter()
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }
}

impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, m) in self.measurements.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", m.label, m.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_keeps_insertion_order() {
        let reading = Reading::new()
            .with("VWC@15cm", 0.31)
            .with("Permittivity@15cm", 12.0)
            .with("SoilT@15cm", 18.4);

        let labels: Vec<_> = reading.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, ["VWC@15cm", "Permittivity@15cm", "SoilT@15cm"]);
    }

    #[test]
    fn test_reading_overwrites_existing_label_in_place() {
        let mut reading = Reading::new().with("a", 1.0).with("b", 2.0);
        reading.insert("a", 5.0);

        assert_eq!(reading.len(), 2);
        assert_eq!(reading.get("a"), Some(5.0));
        assert_eq!(reading.iter().next().map(|m| m.label.as_str()), Some("a"));
    }

    #[test]
    fn test_reading_display() {
        let reading = Reading::new().with("T [°C]", 21.5).with("H [%]", 48.0);
        assert_eq!(reading.to_string(), "T [°C]: 21.5, H [%]: 48");
    }
}
