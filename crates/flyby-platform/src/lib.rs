// SPDX-License-Identifier: CEPL-1.0
//! Window-system glue. Re-exports winit and turns its keyboard and mouse
//! events into transitions over [`flyby_math::InputState`].

pub use winit;

use flyby_math::{InputState, MoveKeys, SpeedModifier};
use winit::event::{ElementState, MouseButton};
use winit::keyboard::{KeyCode, PhysicalKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAction {
    Move(MoveKeys),
    Speed(SpeedModifier),
    Close,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyOutcome {
    Handled,
    CloseRequested,
    Ignored,
}

pub fn key_action(code: KeyCode) -> Option<KeyAction> {
    Some(match code {
        KeyCode::KeyW => KeyAction::Move(MoveKeys::FORWARD),
        KeyCode::KeyS => KeyAction::Move(MoveKeys::BACK),
        KeyCode::KeyA => KeyAction::Move(MoveKeys::LEFT),
        KeyCode::KeyD => KeyAction::Move(MoveKeys::RIGHT),
        KeyCode::KeyE => KeyAction::Move(MoveKeys::UP),
        KeyCode::KeyQ => KeyAction::Move(MoveKeys::DOWN),
        KeyCode::ShiftLeft => KeyAction::Speed(SpeedModifier::Fast),
        KeyCode::ControlLeft => KeyAction::Speed(SpeedModifier::Slow),
        KeyCode::Escape => KeyAction::Close,
        _ => return None,
    })
}

pub fn apply_key(input: &mut InputState, key: PhysicalKey, state: ElementState) -> KeyOutcome {
    let PhysicalKey::Code(code) = key else {
        return KeyOutcome::Ignored;
    };
    let pressed = state == ElementState::Pressed;
    match key_action(code) {
        Some(KeyAction::Move(keys)) => {
            input.set_key(keys, pressed);
            KeyOutcome::Handled
        }
        Some(KeyAction::Speed(modifier)) => {
            input.set_speed(modifier, pressed);
            KeyOutcome::Handled
        }
        Some(KeyAction::Close) if pressed => KeyOutcome::CloseRequested,
        Some(KeyAction::Close) | None => KeyOutcome::Ignored,
    }
}

/// Right-button press toggles mouse-look; returns the new look state when it changed.
pub fn apply_mouse_button(
    input: &mut InputState,
    button: MouseButton,
    state: ElementState,
) -> Option<bool> {
    (button == MouseButton::Right && state == ElementState::Pressed).then(|| input.toggle_look())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wasd_press_and_release() {
        let mut input = InputState::default();
        let w = PhysicalKey::Code(KeyCode::KeyW);
        assert_eq!(apply_key(&mut input, w, ElementState::Pressed), KeyOutcome::Handled);
        assert!(input.held().contains(MoveKeys::FORWARD));
        apply_key(&mut input, w, ElementState::Released);
        assert!(input.held().is_empty());
    }

    #[test]
    fn escape_closes_on_press_only() {
        let mut input = InputState::default();
        let esc = PhysicalKey::Code(KeyCode::Escape);
        assert_eq!(apply_key(&mut input, esc, ElementState::Released), KeyOutcome::Ignored);
        assert_eq!(
            apply_key(&mut input, esc, ElementState::Pressed),
            KeyOutcome::CloseRequested
        );
    }

    #[test]
    fn modifiers_change_speed() {
        let mut input = InputState::default();
        apply_key(&mut input, PhysicalKey::Code(KeyCode::ControlLeft), ElementState::Pressed);
        assert_eq!(input.speed_scale(), 0.33);
        apply_key(&mut input, PhysicalKey::Code(KeyCode::ControlLeft), ElementState::Released);
        assert_eq!(input.speed_scale(), 1.0);
    }

    #[test]
    fn right_click_toggles_look() {
        let mut input = InputState::default();
        assert_eq!(apply_mouse_button(&mut input, MouseButton::Left, ElementState::Pressed), None);
        assert_eq!(
            apply_mouse_button(&mut input, MouseButton::Right, ElementState::Pressed),
            Some(true)
        );
        assert_eq!(apply_mouse_button(&mut input, MouseButton::Right, ElementState::Released), None);
        assert_eq!(
            apply_mouse_button(&mut input, MouseButton::Right, ElementState::Pressed),
            Some(false)
        );
    }

    #[test]
    fn unmapped_keys_are_ignored() {
        let mut input = InputState::default();
        let out = apply_key(&mut input, PhysicalKey::Code(KeyCode::KeyZ), ElementState::Pressed);
        assert_eq!(out, KeyOutcome::Ignored);
    }
}
