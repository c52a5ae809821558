use super::*;

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/chargelog.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8090,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_year: 2020,
            max_voltage: 1000.0,
        }
    }
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            voltage_spike_threshold: 10.0,
            current_spike_threshold: 5.0,
            min_power_factor: 0.85,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_root: "Data".to_string(),
            logging: LoggingConfig::default(),
            web: WebConfig::default(),
            validation: ValidationConfig::default(),
            anomaly: AnomalyConfig::default(),
            events: EventsConfig::default(),
        }
    }
}
