//! Legal state transitions of a single media resource.
//!
//! Every leaf player consults these functions before touching its platform
//! resource. Each returns the state to move to, `None` when the call is a
//! harmless no-op, or an error when the call is structurally invalid.

use super::error::{PlayerError, PlayerResult};
use super::PlayerState;
use super::PlayerState::*;

fn reject(op: &'static str, state: PlayerState) -> PlayerError {
    if state == End {
        PlayerError::Released(op)
    } else {
        PlayerError::illegal(op, state)
    }
}

pub(crate) fn prepare(state: PlayerState) -> PlayerResult<PlayerState> {
    match state {
        Initialized | Stopped => Ok(Preparing),
        other => Err(reject("prepare", other)),
    }
}

pub(crate) fn start(state: PlayerState) -> PlayerResult<Option<PlayerState>> {
    match state {
        Started => Ok(None),
        Prepared | Paused | PlaybackCompleted => Ok(Some(Started)),
        other => Err(reject("start", other)),
    }
}

pub(crate) fn pause(state: PlayerState) -> PlayerResult<Option<PlayerState>> {
    match state {
        Started => Ok(Some(Paused)),
        Prepared | Paused | PlaybackCompleted => Ok(None),
        other => Err(reject("pause", other)),
    }
}

pub(crate) fn stop(state: PlayerState) -> PlayerResult<Option<PlayerState>> {
    match state {
        Stopped => Ok(None),
        Prepared | Started | Paused | PlaybackCompleted => Ok(Some(Stopped)),
        other => Err(reject("stop", other)),
    }
}

pub(crate) fn seek(state: PlayerState) -> PlayerResult<()> {
    if state.is_prepared() {
        Ok(())
    } else {
        Err(reject("seek", state))
    }
}

pub(crate) fn reset(state: PlayerState) -> PlayerResult<PlayerState> {
    match state {
        End => Err(PlayerError::Released("reset")),
        _ => Ok(Idle),
    }
}

pub(crate) fn release(state: PlayerState) -> PlayerResult<PlayerState> {
    match state {
        End => Err(PlayerError::Released("release")),
        _ => Ok(End),
    }
}

pub(crate) fn duration(state: PlayerState) -> PlayerResult<()> {
    if state.is_prepared() || state == Stopped {
        Ok(())
    } else {
        Err(reject("read duration of", state))
    }
}

pub(crate) fn chain(state: PlayerState) -> PlayerResult<()> {
    match state {
        End => Err(PlayerError::Released("chain")),
        s if s.is_prepared() => Ok(()),
        _ => Err(PlayerError::NotPrepared("chain")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [PlayerState; 9] = [
        Idle,
        Initialized,
        Preparing,
        Prepared,
        Started,
        Paused,
        Stopped,
        PlaybackCompleted,
        End,
    ];

    #[test]
    fn test_prepare_only_from_initialized_or_stopped() {
        for state in ALL {
            let result = prepare(state);
            match state {
                Initialized | Stopped => assert_eq!(result, Ok(Preparing)),
                _ => assert!(result.is_err(), "{state}"),
            }
        }
    }

    #[test]
    fn test_start() {
        assert_eq!(start(Started), Ok(None));
        assert_eq!(start(Prepared), Ok(Some(Started)));
        assert_eq!(start(Paused), Ok(Some(Started)));
        assert_eq!(start(PlaybackCompleted), Ok(Some(Started)));
        assert_eq!(
            start(Initialized),
            Err(PlayerError::illegal("start", Initialized))
        );
        assert_eq!(start(End), Err(PlayerError::Released("start")));
    }

    #[test]
    fn test_pause_is_idempotent() {
        assert_eq!(pause(Started), Ok(Some(Paused)));
        assert_eq!(pause(Paused), Ok(None));
        assert_eq!(pause(Prepared), Ok(None));
        assert!(pause(Stopped).is_err());
        assert!(pause(Preparing).is_err());
    }

    #[test]
    fn test_stop() {
        assert_eq!(stop(Stopped), Ok(None));
        assert_eq!(stop(Started), Ok(Some(Stopped)));
        assert!(stop(Idle).is_err());
    }

    #[test]
    fn test_seek_requires_prepared() {
        assert!(seek(Prepared).is_ok());
        assert!(seek(PlaybackCompleted).is_ok());
        assert!(seek(Stopped).is_err());
        assert!(seek(Preparing).is_err());
    }

    #[test]
    fn test_reset_and_release() {
        for state in ALL {
            if state == End {
                assert!(reset(state).is_err());
                assert_eq!(release(state), Err(PlayerError::Released("release")));
            } else {
                assert_eq!(reset(state), Ok(Idle));
                assert_eq!(release(state), Ok(End));
            }
        }
    }

    #[test]
    fn test_duration() {
        assert!(duration(Stopped).is_ok());
        assert!(duration(Started).is_ok());
        assert!(duration(Initialized).is_err());
    }

    #[test]
    fn test_chain() {
        assert!(chain(Prepared).is_ok());
        assert_eq!(chain(Preparing), Err(PlayerError::NotPrepared("chain")));
        assert_eq!(chain(End), Err(PlayerError::Released("chain")));
    }
}
