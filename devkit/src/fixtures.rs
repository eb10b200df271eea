/*!
CLI output fixtures shaped like real OLT replies.
*/

/// Full-width separator used around Nokia table titles.
const SEPARATOR: &str = "========================================================================================";

/// `show equipment ont optics` output with one row per (index, olt-rx).
pub fn optics_table(rows: &[(&str, f64)]) -> String {
    let mut out = String::from("typ:isadmin># show equipment ont optics\n");
    out.push_str(SEPARATOR);
    out.push_str("\noptics table\n");
    out.push_str(SEPARATOR);
    out.push_str("\nont-idx       |olt-rx-sig-level|rx-signal-level|tx-signal-level|ont-voltage\n");
    out.push_str("--------------+----------------+---------------+---------------+-----------\n");
    for (idx, rx) in rows {
        out.push_str(&format!("{idx:<14}{rx:<17.2}-21.30          2.10            3.30\n"));
    }
    out.push_str(SEPARATOR);
    out.push_str(&format!("\noptics count : {}\n", rows.len()));
    out.push_str("typ:isadmin>#");
    out
}

/// `show equipment ont status pon` output, rows are (ont index, desc1, desc2).
pub fn ont_status(rows: &[(&str, &str, &str)]) -> String {
    let mut out = String::from(
        "pon        ont          sernum          adm-state opr-state olt-rx-sig ont-olt desc1        desc2\r\n\
         ---------- ------------ --------------- --------- --------- ---------- ------- ------------ -----\r\n",
    );
    for (idx, desc1, desc2) in rows {
        let pon = idx.rsplit_once('/').map(|(pon, _)| pon).unwrap_or(*idx);
        out.push_str(&format!(
            "{pon:<10} {idx:<12} ALCL:00000000   up        up        -21.50     2.3     \"{desc1}\"  \"{desc2}\"\r\n"
        ));
    }
    out
}

/// Combined reply of the three health commands.
pub fn health_output(uptime: &str, cpu: &[(&str, i64)]) -> String {
    let mut out = String::from("typ:isadmin># show system cpu-load detail\n");
    for (slot, avg) in cpu {
        out.push_str(&format!("slot : {slot}   cpu-load-total(%) : {avg}   average(%) : {avg}\n"));
    }
    out.push_str("typ:isadmin># show core1-uptime\n");
    out.push_str(&format!("System Up Time         : {uptime} (hr:min:sec)\n"));
    out.push_str("typ:isadmin># show equipment temperature\n");
    out.push_str("slot     sensor-id  act-temp  tca-low  tca-high  shut-low  shut-high\n");
    out.push_str("nt-a     1          41        0        75        0         85\n");
    out
}

/// `show port-protection` output, rows are (port, port-state, paired-state).
pub fn port_protection(rows: &[(&str, &str, &str)]) -> String {
    let mut out = String::from(
        "port          paired-port   port-state   paired-state   swo-reason   num-swo\n\
         ------------- ------------- ------------ -------------- ------------ -------\n",
    );
    for (port, state, paired) in rows {
        out.push_str(&format!("{port:<13} pon:9/9/9/9   {state:<12} {paired:<14} none         2\n"));
    }
    out
}

/// `info configure flat` output with an interleaved alarm line and spinner.
pub fn config_dump(system_id: &str) -> String {
    format!(
        "\n\nconfigure system id {system_id}\n\
         24/10/18 09:12:44 minor alarm pon-los raised on 1/1/4/2\n\
         configure equipment slot lt:1/1/1 planned-type fglt-b\n\
         -\\|/-\\|/\n\n\n\n\n\
         configure port-protection pon:1/1/1/1 paired-port pon:1/1/2/1\n\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use oltwatch_kernel::extract::{
        clean_backup_output, extract_all_desc, extract_all_ont_power, extract_health,
        extract_port_protection,
    };

    #[test]
    fn test_fixtures_parse() {
        let power = extract_all_ont_power(&optics_table(&[("1/1/1/1", -22.5), ("1/1/1/2", -25.1)]));
        assert_eq!(power.len(), 2);
        assert_eq!(power[1].olt_rx, -25.1);

        let descs = extract_all_desc(&ont_status(&[("1/1/1/1/1", "CUST-1", "Main St 5")]));
        assert_eq!(descs.len(), 1);
        assert_eq!(descs[0].ont_idx, "1/1/1/1/1");
        assert_eq!(descs[0].desc1, "CUST-1");
        assert_eq!(descs[0].desc2, "Main St 5");

        let health = extract_health(&health_output("3 days, 01:00:00.00", &[("nt-a", 12)]));
        assert_eq!(health.uptime, "3 days, 01:00:00.00");
        assert_eq!(health.cpu_loads.len(), 1);
        assert_eq!(health.temperatures.len(), 1);

        let ports = extract_port_protection(&port_protection(&[("pon:1/1/1/1", "down", "up")]));
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].num_swo, 2);

        let cleaned = clean_backup_output(&config_dump("OLT-A"));
        assert!(cleaned.starts_with("configure system id OLT-A"));
        assert!(!cleaned.contains("alarm"));
        assert!(!cleaned.contains("\n\n\n"));
    }
}
