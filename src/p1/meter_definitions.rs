use super::structs::{MeasurementDefinition, UnitTable};
use crate::obis_utils::get_obis_description;
use crate::vscp::CLASS2_MEASUREMENT_FLOAT;
use log::warn;

// CLASS1.MEASUREMENT types
const TYPE_ELECTRIC_CURRENT: u16 = 5;
const TYPE_ENERGY: u16 = 13;
const TYPE_POWER: u16 = 14;
const TYPE_VOLTAGE: u16 = 16;

// Unit codes within those types
const UNIT_AMPERE: u8 = 0;
const UNIT_KWH: u8 = 1;
const UNIT_WH: u8 = 2;
const UNIT_WATT: u8 = 0;
const UNIT_VOLT: u8 = 0;

fn han_item(
    token: &str,
    storage_name: &str,
    vscp_type: u16,
    sensor_index: u8,
    units: &[(&str, u8)],
    factor: f64,
) -> Option<MeasurementDefinition> {
    let mut def = match MeasurementDefinition::new(token, CLASS2_MEASUREMENT_FLOAT, vscp_type) {
        Ok(d) => d,
        Err(e) => {
            warn!("Built-in item {} rejected: {}", token, e);
            return None;
        }
    };

    let mut table = UnitTable::new();
    for (meter_unit, code) in units {
        table.insert(meter_unit, *code);
    }

    def.description = get_obis_description(token).unwrap_or(storage_name).to_string();
    def.storage_name = storage_name.to_string();
    def.sensor_index = sensor_index;
    def.factor = factor;
    def.units = table;
    Some(def)
}

/// Measurements found in a typical HAN port P1 telegram, all as Level II float events.
/// Power readings arrive in kW and are scaled to W.
pub fn get_han_p1_definitions() -> Vec<MeasurementDefinition> {
    let energy: &[(&str, u8)] = &[("kWh", UNIT_KWH), ("Wh", UNIT_WH)];
    let power: &[(&str, u8)] = &[("kW", UNIT_WATT)];
    let voltage: &[(&str, u8)] = &[("V", UNIT_VOLT)];
    let current: &[(&str, u8)] = &[("A", UNIT_AMPERE)];

    [
        han_item("1-0:1.8.0", "energy_import", TYPE_ENERGY, 0, energy, 1.0),
        han_item("1-0:2.8.0", "energy_export", TYPE_ENERGY, 1, energy, 1.0),
        han_item("1-0:1.7.0", "power_import", TYPE_POWER, 0, power, 1000.0),
        han_item("1-0:2.7.0", "power_export", TYPE_POWER, 1, power, 1000.0),
        han_item("1-0:21.7.0", "power_import_l1", TYPE_POWER, 2, power, 1000.0),
        han_item("1-0:41.7.0", "power_import_l2", TYPE_POWER, 3, power, 1000.0),
        han_item("1-0:61.7.0", "power_import_l3", TYPE_POWER, 4, power, 1000.0),
        han_item("1-0:22.7.0", "power_export_l1", TYPE_POWER, 5, power, 1000.0),
        han_item("1-0:42.7.0", "power_export_l2", TYPE_POWER, 6, power, 1000.0),
        han_item("1-0:62.7.0", "power_export_l3", TYPE_POWER, 7, power, 1000.0),
        han_item("1-0:32.7.0", "voltage_l1", TYPE_VOLTAGE, 0, voltage, 1.0),
        han_item("1-0:52.7.0", "voltage_l2", TYPE_VOLTAGE, 1, voltage, 1.0),
        han_item("1-0:72.7.0", "voltage_l3", TYPE_VOLTAGE, 2, voltage, 1.0),
        han_item("1-0:31.7.0", "current_l1", TYPE_ELECTRIC_CURRENT, 0, current, 1.0),
        han_item("1-0:51.7.0", "current_l2", TYPE_ELECTRIC_CURRENT, 1, current, 1.0),
        han_item("1-0:71.7.0", "current_l3", TYPE_ELECTRIC_CURRENT, 2, current, 1.0),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Telegram as emitted by an Aidon/Kaifa style HAN port.
pub fn create_example_telegram() -> &'static str {
    r"/ELL5\253833635_A
0-0:1.0.0(210511210508W)
1-0:1.8.0(00001576.782*kWh)
1-0:2.8.0(00000000.001*kWh)
1-0:3.8.0(00000009.258*kvarh)
1-0:4.8.0(00000072.421*kvarh)
1-0:1.7.0(0007.171*kW)
1-0:2.7.0(0000.000*kW)
1-0:3.7.0(0000.063*kvar)
1-0:4.7.0(0000.523*kvar)
1-0:21.7.0(0001.180*kW)
1-0:41.7.0(0004.253*kW)
1-0:61.7.0(0001.736*kW)
1-0:22.7.0(0000.000*kW)
1-0:42.7.0(0000.000*kW)
1-0:62.7.0(0000.000*kW)
1-0:32.7.0(236.2*V)
1-0:52.7.0(231.1*V)
1-0:72.7.0(236.2*V)
1-0:31.7.0(005.5*A)
1-0:51.7.0(018.4*A)
1-0:71.7.0(007.3*A)
!A0B1"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_han_p1_definitions() {
        let defs = get_han_p1_definitions();
        assert_eq!(defs.len(), 16);

        let import = defs.iter().find(|d| d.token() == "1-0:1.8.0").unwrap();
        assert_eq!(import.storage_name, "energy_import");
        assert_eq!(import.description, "Active energy import (total)");
        assert_eq!(import.vscp_class(), CLASS2_MEASUREMENT_FLOAT);
        assert_eq!(import.unit_code(Some("kWh")), UNIT_KWH);

        let power = defs.iter().find(|d| d.token() == "1-0:1.7.0").unwrap();
        assert_eq!(power.factor, 1000.0);
    }

    #[test]
    fn test_tokens_do_not_overlap() {
        let defs = get_han_p1_definitions();
        for a in &defs {
            let matches = defs.iter().filter(|b| b.matches(a.token())).count();
            assert_eq!(matches, 1, "{} matched more than one definition", a.token());
        }
    }

    #[test]
    fn test_example_telegram() {
        let telegram = create_example_telegram();
        assert!(telegram.starts_with("/ELL5"));
        assert!(telegram.contains("1-0:32.7.0(236.2*V)"));
        assert_eq!(telegram.lines().count(), 23);
    }
}
