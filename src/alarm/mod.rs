use crate::config::ConfigError;
use crate::queue::EventSink;
use crate::vscp::{Guid, VscpEvent, CLASS1_ALARM, TYPE_ALARM_ALARM, TYPE_ALARM_RESET};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmOp {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
}

impl FromStr for AlarmOp {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" => Ok(AlarmOp::GreaterThan),
            "<" => Ok(AlarmOp::LessThan),
            other => Err(ConfigError::InvalidOperator(other.to_string())),
        }
    }
}

impl fmt::Display for AlarmOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmOp::GreaterThan => write!(f, ">"),
            AlarmOp::LessThan => write!(f, "<"),
        }
    }
}

/// Which of the two rule maps a rule lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmSet {
    On,
    Off,
}

impl FromStr for AlarmSet {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "on" => Ok(AlarmSet::On),
            "off" => Ok(AlarmSet::Off),
            other => Err(ConfigError::InvalidAlarmType(other.to_string())),
        }
    }
}

impl fmt::Display for AlarmSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmSet::On => write!(f, "on"),
            AlarmSet::Off => write!(f, "off"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmRule {
    variable: String,
    pub op: AlarmOp,
    pub threshold: f64,
    pub one_shot: bool,
    pub alarm_byte: u8,
    pub zone: u8,
    pub subzone: u8,
    sent: bool,
}

impl AlarmRule {
    pub fn new(variable: &str, op: AlarmOp, threshold: f64) -> Result<Self, ConfigError> {
        if variable.is_empty() {
            return Err(ConfigError::EmptyVariable);
        }

        Ok(AlarmRule {
            variable: variable.to_string(),
            op,
            threshold,
            one_shot: false,
            alarm_byte: 0,
            zone: 0,
            subzone: 0,
            sent: false,
        })
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Only GreaterThan honours the one-shot guard.
    pub fn triggers(&self, value: f64) -> bool {
        match self.op {
            AlarmOp::GreaterThan => self.threshold > value && !(self.sent && self.one_shot),
            AlarmOp::LessThan => self.threshold < value,
        }
    }

    /// OFF rules emit RESET on GreaterThan only, everything else is ALARM.
    pub fn event_type(&self, set: AlarmSet) -> u16 {
        match (set, self.op) {
            (AlarmSet::Off, AlarmOp::GreaterThan) => TYPE_ALARM_RESET,
            _ => TYPE_ALARM_ALARM,
        }
    }

    fn make_event(&self, set: AlarmSet, guid: Guid) -> VscpEvent {
        VscpEvent::new(
            CLASS1_ALARM,
            self.event_type(set),
            guid,
            vec![self.alarm_byte, self.zone, self.subzone],
        )
    }
}

/// ON and OFF rules keyed by the storage name they watch.
#[derive(Debug, Default)]
pub struct AlarmEvaluator {
    on: HashMap<String, AlarmRule>,
    off: HashMap<String, AlarmRule>,
}

impl AlarmEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    fn rules(&self, set: AlarmSet) -> &HashMap<String, AlarmRule> {
        match set {
            AlarmSet::On => &self.on,
            AlarmSet::Off => &self.off,
        }
    }

    fn rules_mut(&mut self, set: AlarmSet) -> &mut HashMap<String, AlarmRule> {
        match set {
            AlarmSet::On => &mut self.on,
            AlarmSet::Off => &mut self.off,
        }
    }

    pub fn add_rule(&mut self, set: AlarmSet, rule: AlarmRule) -> Result<(), ConfigError> {
        let key = rule.variable().to_string();

        if self.rules(set).contains_key(&key) {
            return Err(ConfigError::DuplicateAlarm(set.to_string(), key));
        }

        let other = match set {
            AlarmSet::On => AlarmSet::Off,
            AlarmSet::Off => AlarmSet::On,
        };
        if self.rules(other).contains_key(&key) {
            warn!(
                "Variable {} has both an ON and an OFF alarm, OFF '>' rules emit RESET while ON rules emit ALARM",
                key
            );
        }

        debug!("Adding {} alarm for {} ({} {})", set, key, rule.op, rule.threshold);
        self.rules_mut(set).insert(key, rule);
        Ok(())
    }

    pub fn get(&self, set: AlarmSet, variable: &str) -> Option<&AlarmRule> {
        self.rules(set).get(variable)
    }

    pub fn len(&self) -> usize {
        self.on.len() + self.off.len()
    }

    pub fn is_empty(&self) -> bool {
        self.on.is_empty() && self.off.is_empty()
    }

    /// Checks the ON and then the OFF rule for `variable`. Returns the number
    /// of alarm events handed to the sink.
    pub fn evaluate<S: EventSink + ?Sized>(&mut self, variable: &str, value: f64, guid: Guid, sink: &S) -> usize {
        let mut sent = 0;

        for set in [AlarmSet::On, AlarmSet::Off] {
            let Some(rule) = self.rules_mut(set).get_mut(variable) else {
                continue;
            };

            if !rule.triggers(value) {
                continue;
            }

            match sink.push(rule.make_event(set, guid)) {
                Ok(_) => {
                    debug!("Sent {} alarm [{}] value={}", set, variable, value);
                    rule.sent = true;
                    sent += 1;
                }
                Err(e) => {
                    error!("Alarm {}: failed to add event to receive queue: {}", set, e);
                }
            }
        }

        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::EmitError;
    use std::cell::RefCell;

    #[derive(Default)]
    struct VecSink {
        events: RefCell<Vec<VscpEvent>>,
    }

    impl EventSink for VecSink {
        fn push(&self, event: VscpEvent) -> Result<(), EmitError> {
            self.events.borrow_mut().push(event);
            Ok(())
        }
    }

    struct FullSink;

    impl EventSink for FullSink {
        fn push(&self, _event: VscpEvent) -> Result<(), EmitError> {
            Err(EmitError::QueueFull("receive"))
        }
    }

    fn rule(op: AlarmOp, threshold: f64, one_shot: bool) -> AlarmRule {
        let mut r = AlarmRule::new("power", op, threshold).unwrap();
        r.one_shot = one_shot;
        r.alarm_byte = 7;
        r.zone = 1;
        r.subzone = 2;
        r
    }

    #[test]
    fn test_one_shot_suppression() {
        let mut eval = AlarmEvaluator::new();
        eval.add_rule(AlarmSet::On, rule(AlarmOp::GreaterThan, 10.0, true)).unwrap();
        let sink = VecSink::default();
        let guid = Guid::default().with_lsb(3);

        assert_eq!(eval.evaluate("power", 5.0, guid, &sink), 1);
        assert!(eval.get(AlarmSet::On, "power").unwrap().is_sent());
        assert_eq!(eval.evaluate("power", 5.0, guid, &sink), 0);
        assert_eq!(eval.evaluate("power", 5.0, guid, &sink), 0);

        let events = sink.events.borrow();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].vscp_class, CLASS1_ALARM);
        assert_eq!(events[0].vscp_type, TYPE_ALARM_ALARM);
        assert_eq!(events[0].data, vec![7, 1, 2]);
        assert_eq!(events[0].guid.0[15], 3);
    }

    #[test]
    fn test_non_one_shot_repeats() {
        let mut eval = AlarmEvaluator::new();
        eval.add_rule(AlarmSet::On, rule(AlarmOp::GreaterThan, 10.0, false)).unwrap();
        let sink = VecSink::default();

        eval.evaluate("power", 5.0, Guid::default(), &sink);
        eval.evaluate("power", 5.0, Guid::default(), &sink);
        assert_eq!(sink.events.borrow().len(), 2);
    }

    #[test]
    fn test_greater_than_not_triggered() {
        let mut eval = AlarmEvaluator::new();
        eval.add_rule(AlarmSet::On, rule(AlarmOp::GreaterThan, 10.0, true)).unwrap();
        let sink = VecSink::default();

        assert_eq!(eval.evaluate("power", 15.0, Guid::default(), &sink), 0);
        assert!(!eval.get(AlarmSet::On, "power").unwrap().is_sent());
    }

    #[test]
    fn test_less_than_ignores_one_shot() {
        let mut eval = AlarmEvaluator::new();
        eval.add_rule(AlarmSet::On, rule(AlarmOp::LessThan, 10.0, true)).unwrap();
        let sink = VecSink::default();

        assert_eq!(eval.evaluate("power", 5.0, Guid::default(), &sink), 0);
        assert_eq!(eval.evaluate("power", 15.0, Guid::default(), &sink), 1);
        assert_eq!(eval.evaluate("power", 15.0, Guid::default(), &sink), 1);
        assert_eq!(sink.events.borrow().len(), 2);
    }

    #[test]
    fn test_off_set_event_types() {
        let mut eval = AlarmEvaluator::new();
        eval.add_rule(AlarmSet::Off, rule(AlarmOp::GreaterThan, 10.0, false)).unwrap();
        let sink = VecSink::default();
        eval.evaluate("power", 5.0, Guid::default(), &sink);
        assert_eq!(sink.events.borrow()[0].vscp_type, TYPE_ALARM_RESET);

        let mut eval = AlarmEvaluator::new();
        eval.add_rule(AlarmSet::Off, rule(AlarmOp::LessThan, 10.0, false)).unwrap();
        let sink = VecSink::default();
        eval.evaluate("power", 15.0, Guid::default(), &sink);
        assert_eq!(sink.events.borrow()[0].vscp_type, TYPE_ALARM_ALARM);
    }

    #[test]
    fn test_on_and_off_fire_on_same_value() {
        let mut eval = AlarmEvaluator::new();
        eval.add_rule(AlarmSet::On, rule(AlarmOp::GreaterThan, 10.0, false)).unwrap();
        eval.add_rule(AlarmSet::Off, rule(AlarmOp::GreaterThan, 10.0, false)).unwrap();
        let sink = VecSink::default();

        assert_eq!(eval.evaluate("power", 5.0, Guid::default(), &sink), 2);
        let events = sink.events.borrow();
        assert_eq!(events[0].vscp_type, TYPE_ALARM_ALARM);
        assert_eq!(events[1].vscp_type, TYPE_ALARM_RESET);
    }

    #[test]
    fn test_sent_flag_only_after_enqueue() {
        let mut eval = AlarmEvaluator::new();
        eval.add_rule(AlarmSet::On, rule(AlarmOp::GreaterThan, 10.0, true)).unwrap();

        assert_eq!(eval.evaluate("power", 5.0, Guid::default(), &FullSink), 0);
        assert!(!eval.get(AlarmSet::On, "power").unwrap().is_sent());

        let sink = VecSink::default();
        assert_eq!(eval.evaluate("power", 5.0, Guid::default(), &sink), 1);
    }

    #[test]
    fn test_duplicate_rules_rejected() {
        let mut eval = AlarmEvaluator::new();
        eval.add_rule(AlarmSet::On, rule(AlarmOp::GreaterThan, 10.0, true)).unwrap();
        assert!(matches!(
            eval.add_rule(AlarmSet::On, rule(AlarmOp::LessThan, 1.0, true)),
            Err(ConfigError::DuplicateAlarm(_, _))
        ));
        eval.add_rule(AlarmSet::Off, rule(AlarmOp::LessThan, 1.0, true)).unwrap();
        assert!(matches!(
            eval.add_rule(AlarmSet::Off, rule(AlarmOp::LessThan, 2.0, true)),
            Err(ConfigError::DuplicateAlarm(_, _))
        ));
        assert_eq!(eval.len(), 2);
    }

    #[test]
    fn test_unwatched_variable() {
        let mut eval = AlarmEvaluator::new();
        eval.add_rule(AlarmSet::On, rule(AlarmOp::GreaterThan, 10.0, true)).unwrap();
        let sink = VecSink::default();
        assert_eq!(eval.evaluate("voltage", 5.0, Guid::default(), &sink), 0);
    }

    #[test]
    fn test_parse_op_and_set() {
        assert_eq!(">".parse::<AlarmOp>().unwrap(), AlarmOp::GreaterThan);
        assert_eq!("<".parse::<AlarmOp>().unwrap(), AlarmOp::LessThan);
        assert!(matches!("=".parse::<AlarmOp>(), Err(ConfigError::InvalidOperator(_))));
        assert_eq!("ON".parse::<AlarmSet>().unwrap(), AlarmSet::On);
        assert_eq!("off".parse::<AlarmSet>().unwrap(), AlarmSet::Off);
        assert!(matches!("maybe".parse::<AlarmSet>(), Err(ConfigError::InvalidAlarmType(_))));
        assert_eq!(AlarmRule::new("", AlarmOp::LessThan, 1.0), Err(ConfigError::EmptyVariable));
    }
}
