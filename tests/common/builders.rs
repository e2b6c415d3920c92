//! Test data builders for creating test objects

use sumo_rs::types::{duration, JobRequest};

/// Builder for dynamic-run requests against a test plant model
pub struct PlantRequestBuilder {
    model: String,
    variables: Vec<String>,
    sets: Vec<(String, String)>,
    stop_hours: u64,
    report_hours: u64,
}

impl PlantRequestBuilder {
    pub fn new() -> Self {
        Self {
            model: "plant/sumoproject.dll".to_string(),
            variables: Vec::new(),
            sets: Vec::new(),
            stop_hours: 1,
            report_hours: 1,
        }
    }

    pub fn model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn report(mut self, variable: &str) -> Self {
        self.variables.push(variable.to_string());
        self
    }

    pub fn set(mut self, variable: &str, value: impl ToString) -> Self {
        self.sets.push((variable.to_string(), value.to_string()));
        self
    }

    /// Run for `stop` simulated hours, reporting every `every` hours
    pub fn hours(mut self, stop: u64, every: u64) -> Self {
        self.stop_hours = stop;
        self.report_hours = every;
        self
    }

    pub fn build(self) -> JobRequest {
        let mut request = JobRequest::new(self.model).variables(self.variables);
        for (variable, value) in &self.sets {
            request = request.set(variable, value);
        }
        request.dynamic_run(
            self.stop_hours * duration::HOUR,
            self.report_hours * duration::HOUR,
        )
    }
}

impl Default for PlantRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plant_request_builder() {
        let request = PlantRequestBuilder::new()
            .report("Sumo__Plant__Effluent__TN")
            .set("Sumo__Plant__Temp", 12)
            .hours(3, 1)
            .build();

        assert_eq!(request.variables, vec!["Sumo__Plant__Effluent__TN"]);
        assert_eq!(request.commands[0], "set Sumo__Plant__Temp 12");
        assert!(request.commands.contains(&"set Sumo__StopTime 10800000".to_string()));
    }
}
