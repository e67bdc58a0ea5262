//! Merges the UART distance path with the fast digital presence line.

use super::zone::Zone;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EdgeStatus {
    pub available: bool,
    pub present: bool,
}

/// What the serial path currently believes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartView {
    pub online: bool,
    pub zone: Zone,
    pub distance_cm: Option<u32>,
    pub last_non_away: Option<Zone>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    pub is_present: bool,
    pub zone: Zone,
    pub distance_cm: Option<u32>,
}

/// Either source can assert presence. Zone and distance only ever come from
/// the serial path; while the edge line holds presence ahead of a lagging
/// serial `away`, the last non-away zone is kept instead of flickering.
/// An offline sensor always reports `away`.
pub fn reconcile(uart: &UartView, edge: EdgeStatus) -> Reconciled {
    let edge_present = edge.available && edge.present;
    if !uart.online {
        return Reconciled {
            is_present: edge_present,
            zone: Zone::Away,
            distance_cm: None,
        };
    }

    let uart_present = uart.zone != Zone::Away;
    if uart_present {
        return Reconciled {
            is_present: true,
            zone: uart.zone,
            distance_cm: uart.distance_cm,
        };
    }

    if edge_present {
        return Reconciled {
            is_present: true,
            zone: uart.last_non_away.unwrap_or(Zone::Away),
            distance_cm: None,
        };
    }

    Reconciled {
        is_present: false,
        zone: Zone::Away,
        distance_cm: None,
    }
}
