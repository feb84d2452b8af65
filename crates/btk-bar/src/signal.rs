//! Strategy output: what a strategy wants to do on a given bar.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::micros::Micros;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalType {
    Buy,
    Sell,
    Hold,
    Close,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalStrength {
    Weak,
    Medium,
    Strong,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Signal {
    pub signal_type: SignalType,
    pub strength: SignalStrength,
    pub price: Option<Micros>,
    pub quantity: Option<i64>,
    pub stop_loss: Option<Micros>,
    pub take_profit: Option<Micros>,
    pub reason: String,
    /// Clamped to `[0, 1]` at construction.
    pub confidence: f64,
    pub timestamp: i64,
    pub metadata: BTreeMap<String, String>,
}

impl Signal {
    pub fn hold(timestamp: i64) -> Signal {
        Signal {
            signal_type: SignalType::Hold,
            strength: SignalStrength::Weak,
            price: None,
            quantity: None,
            stop_loss: None,
            take_profit: None,
            reason: String::new(),
            confidence: 0.0,
            timestamp,
            metadata: BTreeMap::new(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn entry(
        signal_type: SignalType,
        strength: SignalStrength,
        price: Micros,
        stop_loss: Micros,
        take_profit: Micros,
        confidence: f64,
        reason: impl Into<String>,
        timestamp: i64,
    ) -> Signal {
        Signal {
            signal_type,
            strength,
            price: Some(price),
            quantity: None,
            stop_loss: Some(stop_loss),
            take_profit: Some(take_profit),
            reason: reason.into(),
            confidence: confidence.clamp(0.0, 1.0),
            timestamp,
            metadata: BTreeMap::new(),
        }
    }

    pub fn close(reason: impl Into<String>, timestamp: i64) -> Signal {
        Signal {
            signal_type: SignalType::Close,
            strength: SignalStrength::Strong,
            price: None,
            quantity: None,
            stop_loss: None,
            take_profit: None,
            reason: reason.into(),
            confidence: 1.0,
            timestamp,
            metadata: BTreeMap::new(),
        }
    }

    pub fn is_actionable(&self) -> bool {
        !matches!(self.signal_type, SignalType::Hold)
    }
}
