use lazy_static::lazy_static;
use std::collections::HashMap;

lazy_static! {
    static ref HAN_DESCRIPTIONS: HashMap<&'static str, &'static str> = get_han_descriptions();
}

pub fn get_obis_description(obis_code: &str) -> Option<&'static str> {
    HAN_DESCRIPTIONS.get(obis_code).copied()
}

fn get_han_descriptions() -> HashMap<&'static str, &'static str> {
    let mut map = HashMap::new();

    map.insert("0-0:1.0.0", "Date and time");

    // Energy registers
    map.insert("1-0:1.8.0", "Active energy import (total)");
    map.insert("1-0:2.8.0", "Active energy export (total)");
    map.insert("1-0:3.8.0", "Reactive energy import (total)");
    map.insert("1-0:4.8.0", "Reactive energy export (total)");

    // Instantaneous power
    map.insert("1-0:1.7.0", "Active power import");
    map.insert("1-0:2.7.0", "Active power export");
    map.insert("1-0:3.7.0", "Reactive power import");
    map.insert("1-0:4.7.0", "Reactive power export");

    // Per phase power
    map.insert("1-0:21.7.0", "Active power import (L1)");
    map.insert("1-0:41.7.0", "Active power import (L2)");
    map.insert("1-0:61.7.0", "Active power import (L3)");
    map.insert("1-0:22.7.0", "Active power export (L1)");
    map.insert("1-0:42.7.0", "Active power export (L2)");
    map.insert("1-0:62.7.0", "Active power export (L3)");
    map.insert("1-0:23.7.0", "Reactive power import (L1)");
    map.insert("1-0:43.7.0", "Reactive power import (L2)");
    map.insert("1-0:63.7.0", "Reactive power import (L3)");
    map.insert("1-0:24.7.0", "Reactive power export (L1)");
    map.insert("1-0:44.7.0", "Reactive power export (L2)");
    map.insert("1-0:64.7.0", "Reactive power export (L3)");

    // Voltage and current
    map.insert("1-0:32.7.0", "Voltage (L1)");
    map.insert("1-0:52.7.0", "Voltage (L2)");
    map.insert("1-0:72.7.0", "Voltage (L3)");
    map.insert("1-0:31.7.0", "Current (L1)");
    map.insert("1-0:51.7.0", "Current (L2)");
    map.insert("1-0:71.7.0", "Current (L3)");

    map
}

pub fn validate_obis_code(code: &str) -> bool {
    // OBIS code format: A-B:C.D.E
    // A: Medium (0=abstract, 1=electricity)
    // B: Channel
    // C.D.E: Physical value, processing method, tariff

    let Some((ab_part, cde_part)) = code.split_once(':') else {
        return false;
    };

    let ab_parts: Vec<&str> = ab_part.split('-').collect();
    if ab_parts.len() != 2 {
        return false;
    }

    let cde_parts: Vec<&str> = cde_part.split('.').collect();
    if cde_parts.len() != 3 {
        return false;
    }

    ab_parts
        .iter()
        .chain(cde_parts.iter())
        .all(|part| part.parse::<u8>().is_ok())
}
