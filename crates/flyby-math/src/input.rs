// SPDX-License-Identifier: CEPL-1.0
use bitflags::bitflags;
use glam::Vec2;

bitflags! {
    /// Movement keys currently held down.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct MoveKeys: u8 {
        const FORWARD = 1 << 0;
        const BACK    = 1 << 1;
        const LEFT    = 1 << 2;
        const RIGHT   = 1 << 3;
        const UP      = 1 << 4;
        const DOWN    = 1 << 5;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpeedModifier {
    Fast,
    Slow,
}

impl SpeedModifier {
    pub fn scale(self) -> f32 {
        match self {
            SpeedModifier::Fast => 3.0,
            SpeedModifier::Slow => 0.33,
        }
    }
}

/// Everything the window layer tells the camera between two frames.
#[derive(Clone, Debug)]
pub struct InputState {
    held: MoveKeys,
    speed_scale: f32,
    look_enabled: bool,
    pending_look: Vec2,
}

impl Default for InputState {
    fn default() -> Self {
        Self {
            held: MoveKeys::empty(),
            speed_scale: 1.0,
            look_enabled: false,
            pending_look: Vec2::ZERO,
        }
    }
}

impl InputState {
    pub fn set_key(&mut self, keys: MoveKeys, pressed: bool) {
        self.held.set(keys, pressed);
    }

    // Last transition wins, releasing either modifier restores normal speed.
    pub fn set_speed(&mut self, modifier: SpeedModifier, pressed: bool) {
        self.speed_scale = if pressed { modifier.scale() } else { 1.0 };
    }

    /// Flips mouse-look and returns the new state. Turning it off drops any
    /// motion that arrived in between.
    pub fn toggle_look(&mut self) -> bool {
        self.look_enabled = !self.look_enabled;
        if !self.look_enabled {
            self.pending_look = Vec2::ZERO;
        }
        self.look_enabled
    }

    pub fn add_look_delta(&mut self, dx: f32, dy: f32) {
        if self.look_enabled {
            self.pending_look += Vec2::new(dx, dy);
        }
    }

    pub fn take_look_delta(&mut self) -> Vec2 {
        std::mem::take(&mut self.pending_look)
    }

    pub fn held(&self) -> MoveKeys {
        self.held
    }

    pub fn speed_scale(&self) -> f32 {
        self.speed_scale
    }

    pub fn look_enabled(&self) -> bool {
        self.look_enabled
    }

    /// +1 when only `positive` is held, -1 when only `negative` is, else 0.
    pub fn axis(&self, positive: MoveKeys, negative: MoveKeys) -> f32 {
        match (self.held.contains(positive), self.held.contains(negative)) {
            (true, false) => 1.0,
            (false, true) => -1.0,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_keys_cancel() {
        let mut input = InputState::default();
        input.set_key(MoveKeys::FORWARD, true);
        assert_eq!(input.axis(MoveKeys::FORWARD, MoveKeys::BACK), 1.0);
        input.set_key(MoveKeys::BACK, true);
        assert_eq!(input.axis(MoveKeys::FORWARD, MoveKeys::BACK), 0.0);
        input.set_key(MoveKeys::FORWARD, false);
        assert_eq!(input.axis(MoveKeys::FORWARD, MoveKeys::BACK), -1.0);
    }

    #[test]
    fn speed_modifier_release_restores_default() {
        let mut input = InputState::default();
        input.set_speed(SpeedModifier::Fast, true);
        assert_eq!(input.speed_scale(), 3.0);
        input.set_speed(SpeedModifier::Slow, true);
        assert_eq!(input.speed_scale(), 0.33);
        input.set_speed(SpeedModifier::Fast, false);
        assert_eq!(input.speed_scale(), 1.0);
    }

    #[test]
    fn look_motion_is_ignored_until_enabled() {
        let mut input = InputState::default();
        input.add_look_delta(5.0, 5.0);
        assert_eq!(input.take_look_delta(), Vec2::ZERO);

        assert!(input.toggle_look());
        input.add_look_delta(2.0, -1.0);
        input.add_look_delta(1.0, 0.0);
        assert_eq!(input.take_look_delta(), Vec2::new(3.0, -1.0));
        assert_eq!(input.take_look_delta(), Vec2::ZERO);

        input.add_look_delta(4.0, 4.0);
        assert!(!input.toggle_look());
        assert_eq!(input.take_look_delta(), Vec2::ZERO);
    }
}
