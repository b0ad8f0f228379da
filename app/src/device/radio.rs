//! COM standby radio state machine.
//!
//! Device encoder ticks nudge the standby frequency in 25 kHz steps with the
//! 8.33-legacy skip pattern, wrapping at the airband edges. Every adjustment
//! is transmitted back into the simulator; cockpit-side changes flow in
//! through the mapped event so both stay in sync.

use tracing::info;

use crate::rt::ReqTarget;
use crate::sim::link::SimLink;
use crate::sim::{
    DEFAULT_GROUP, DataModel, EventId, OBJECT_ID_USER, RequestPeriod, VarDef, VarKind,
};

const FREQ_VARS: &[VarDef] = &[VarDef {
    kind: VarKind::I32,
    name: "COM STANDBY FREQUENCY:1",
    unit: Some("Hz"),
}];

/// Airband limits, kHz.
const BAND_MIN: i32 = 118_000;
const BAND_MAX: i32 = 136_975;

pub struct Radio {
    model: DataModel,
    /// Standby frequency, kHz.
    com_stby: i32,
    stby_event: EventId,
}

impl Radio {
    pub fn new() -> Self {
        Self {
            model: DataModel::new("Radio", FREQ_VARS),
            com_stby: BAND_MIN,
            stby_event: 0,
        }
    }

    /// Session setup: seed the standby value from the simulator and watch
    /// for cockpit-side changes.
    pub fn initialize(&mut self, link: &mut SimLink<ReqTarget>) {
        link.register_data_model(&mut self.model);
        link.request_data_on_sim_object(
            OBJECT_ID_USER,
            &self.model,
            ReqTarget::RadioFreq,
            RequestPeriod::Once,
        );
        self.stby_event = link.map_event("COM_STBY_RADIO_SET_HZ", ReqTarget::RadioStby);
        link.add_event_to_group(self.stby_event, DEFAULT_GROUP);
    }

    /// One-shot frequency read (Hz on the wire).
    pub fn handle_freq(&mut self, data: &[u8]) {
        let mut rd = crate::sim::decode::Reader::new(data);
        let Ok(hz) = rd.i32() else {
            return;
        };
        self.com_stby = hz / 1000;
        info!("STBY: {:.3}", f64::from(self.com_stby) / 1000.0);
    }

    /// Cockpit-side standby change observed through the mapped event.
    pub fn handle_event(&mut self, data: [u32; 5]) {
        self.com_stby = (data[0] / 1000) as i32;
        info!("STBY: {:.3}", f64::from(self.com_stby) / 1000.0);
    }

    /// Apply encoder ticks and transmit the new standby frequency.
    pub fn adjust(&mut self, link: &mut SimLink<ReqTarget>, value: u32) {
        let ticks = value as i32;
        self.com_stby = step(self.com_stby, ticks);
        link.transmit_event(self.stby_event, (self.com_stby * 1000) as u32);
        info!(
            "STBY: {:.3} ({} ticks)",
            f64::from(self.com_stby) / 1000.0,
            ticks
        );
    }

    pub fn standby_khz(&self) -> i32 {
        self.com_stby
    }
}

/// Move `freq` by `ticks` 5 kHz steps, wrap at the band edges, then skip the
/// four fractions that do not exist in the 25 kHz grid. The wrap runs first
/// so a step off 118000 lands exactly on 136975 and the skip check only ever
/// sees in-band values.
fn step(freq: i32, ticks: i32) -> i32 {
    let mut freq = freq + ticks * 5;
    if freq < BAND_MIN {
        freq += BAND_MAX - BAND_MIN + 5;
    } else if freq > BAND_MAX {
        freq -= BAND_MAX - BAND_MIN + 5;
    }
    let fract = freq % 100;
    if matches!(fract, 20 | 45 | 70 | 95) {
        freq += if ticks > 0 { 5 } else { -5 };
    }
    freq
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_at_band_edges() {
        assert_eq!(step(BAND_MAX, 1), BAND_MIN);
        assert_eq!(step(BAND_MIN, -1), BAND_MAX);
    }

    #[test]
    fn skips_legacy_fractions() {
        assert_eq!(step(118_015, 1), 118_025);
        assert_eq!(step(118_025, -1), 118_015);
        assert_eq!(step(118_040, 1), 118_050);
        assert_eq!(step(118_090, 1), 118_100);
    }

    #[test]
    fn adjust_is_invertible_away_from_the_edges() {
        for start in [118_000, 120_500, 125_015, 136_900] {
            for ticks in 1..5 {
                let up = (0..ticks).fold(start, |f, _| step(f, 1));
                let back = (0..ticks).fold(up, |f, _| step(f, -1));
                assert_eq!(back, start, "start {start} ticks {ticks}");
            }
        }
    }

    #[test]
    fn stays_inside_the_band() {
        let mut freq = BAND_MIN;
        for _ in 0..2000 {
            freq = step(freq, 1);
            assert!((BAND_MIN..=BAND_MAX).contains(&freq), "freq {freq}");
        }
        for _ in 0..2000 {
            freq = step(freq, -1);
            assert!((BAND_MIN..=BAND_MAX).contains(&freq), "freq {freq}");
        }
    }

    #[test]
    fn negative_ticks_come_in_as_wrapped_u32() {
        let mut radio = Radio::new();
        radio.com_stby = 120_000;
        // -1 on the wire; 119995 is a skipped fraction, so the step lands
        // on 119990.
        let ticks = u32::MAX;
        assert_eq!(step(radio.com_stby, ticks as i32), 119_990);
    }
}
