#![no_main]

use evidentia::plan::AnalysisPlan;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Malformed plans must surface as errors, never panics
        if let Ok(plan) = AnalysisPlan::from_yaml_str(input) {
            let yaml = plan.to_yaml_string().unwrap();
            assert!(AnalysisPlan::from_yaml_str(&yaml).is_ok());
        }
        let _ = AnalysisPlan::from_json_str(input);
    }
});
