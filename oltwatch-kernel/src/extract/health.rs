//! OLT health parsing: CPU load, uptime and temperature sensors.
//!
//! The three scans run over the whole combined output of
//! `show system cpu-load detail`, `show core1-uptime` and
//! `show equipment temperature`; they are not bounded by table markers.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{CpuLoad, Temperature};

static CPU_LOAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"slot\s*:\s*(?P<slot>\S+)\s+.*?average\(%\)\s*:\s*(?P<avg>\d+)").unwrap()
});

static UPTIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"System Up Time\s*:\s*(?P<uptime>.+?)\s*\(").unwrap());

// slot, sensor, act-temp, tca-low, tca-high, shut-low, shut-high
static TEMPERATURE_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^(?P<slot>nt-[ab]|lt:\S+)\s+(?P<sensor>\d+)\s+(?P<act>\d+)\s+\d+\s+(?P<tca>\d+)\s+\d+\s+(?P<shut>\d+)",
    )
    .unwrap()
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub uptime: String,
    pub cpu_loads: Vec<CpuLoad>,
    pub temperatures: Vec<Temperature>,
}

pub fn extract_health(output: &str) -> Health {
    let cpu_loads = CPU_LOAD
        .captures_iter(output)
        .map(|caps| CpuLoad {
            slot: caps["slot"].to_string(),
            average: number(&caps["avg"]),
        })
        .collect();

    let uptime = UPTIME
        .captures(output)
        .map(|caps| caps["uptime"].trim().to_string())
        .unwrap_or_default();

    let temperatures = TEMPERATURE_ROW
        .captures_iter(output)
        .map(|caps| Temperature {
            slot: caps["slot"].to_string(),
            sensor_id: number(&caps["sensor"]),
            act_temp: number(&caps["act"]),
            tca_high: number(&caps["tca"]),
            shut_high: number(&caps["shut"]),
        })
        .collect();

    Health { uptime, cpu_loads, temperatures }
}

/// Unparsable (e.g. overflowing) captures count as zero; the row is kept.
fn number(s: &str) -> i64 {
    s.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEALTH: &str = "\
typ:isadmin># show system cpu-load detail
slot : nt-a   cpu-load-total(%) : 17   average(%) : 12
slot : lt:1/1/4   cpu-load-total(%) : 30   average(%) : 28
typ:isadmin># show core1-uptime
System Up Time         : 112 days, 03:25:41.00 (hr:min:sec)
System Up Time         : 1 days (ignored)
typ:isadmin># show equipment temperature
slot     sensor-id  act-temp  tca-low  tca-high  shut-low  shut-high
nt-a     1          41        0        75        0         85
lt:1/1/4 2          52        0        80        0         99999999999999999999
lt:1/1/5 x          52        0        80        0         90
";

    #[test]
    fn test_extract_cpu_loads() {
        let h = extract_health(HEALTH);
        assert_eq!(
            h.cpu_loads,
            vec![
                CpuLoad { slot: "nt-a".into(), average: 12 },
                CpuLoad { slot: "lt:1/1/4".into(), average: 28 },
            ]
        );
    }

    #[test]
    fn test_extract_first_uptime_only() {
        let h = extract_health(HEALTH);
        assert_eq!(h.uptime, "112 days, 03:25:41.00");
    }

    #[test]
    fn test_extract_temperatures_overflow_is_zero() {
        let h = extract_health(HEALTH);
        assert_eq!(h.temperatures.len(), 2);
        assert_eq!(
            h.temperatures[0],
            Temperature { slot: "nt-a".into(), sensor_id: 1, act_temp: 41, tca_high: 75, shut_high: 85 }
        );
        assert_eq!(h.temperatures[1].shut_high, 0);
        assert_eq!(h.temperatures[1].tca_high, 80);
    }

    #[test]
    fn test_empty_output() {
        assert_eq!(extract_health(""), Health::default());
    }
}
