use crate::KilnResult;

/// Progress of a single load attempt.
///
/// A loader moves `NotLoaded -> Loading -> PartialLoaded* -> Loaded | Aborted`. `PartialLoaded`
/// may repeat for progressive loaders (for example one mip level per step). `Loaded` and
/// `Aborted` are terminal, only an explicit reset (a reload) brings a loader back to `NotLoaded`.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum LoadingState {
    /// The resource is not loaded yet
    NotLoaded,
    /// Loading is in progress, nothing can be committed yet
    Loading,
    /// Some data is decoded and can be committed and used
    PartialLoaded,
    /// The resource is fully decoded
    Loaded,
    /// Loading failed
    Aborted,
}

impl Default for LoadingState {
    fn default() -> Self {
        LoadingState::NotLoaded
    }
}

impl LoadingState {
    pub fn is_stopped(self) -> bool {
        matches!(self, LoadingState::Loaded | LoadingState::Aborted)
    }

    pub fn can_commit(self) -> bool {
        matches!(self, LoadingState::PartialLoaded | LoadingState::Loaded)
    }

    fn rank(self) -> u8 {
        match self {
            LoadingState::NotLoaded => 0,
            LoadingState::Loading => 1,
            LoadingState::PartialLoaded => 2,
            LoadingState::Loaded | LoadingState::Aborted => 3,
        }
    }

    /// Returns true if a loader may go from `from` to `to` without being reset
    pub fn is_valid_transition(
        from: LoadingState,
        to: LoadingState,
    ) -> bool {
        if from.is_stopped() {
            return from == to;
        }

        // Decoding can't go back to "nothing happened yet"
        if to == LoadingState::NotLoaded {
            return from == LoadingState::NotLoaded;
        }

        // PartialLoaded may repeat, everything else only moves forward
        from.rank() < to.rank()
            || (from == to && matches!(from, LoadingState::Loading | LoadingState::PartialLoaded))
    }

    /// Maps a fallible decode into a state, an error is logged and aborts the load
    pub fn from_result<T>(
        result: KilnResult<T>,
        on_success: LoadingState,
    ) -> LoadingState {
        match result {
            Ok(_) => on_success,
            Err(e) => {
                log::warn!("decode failed: {}", e);
                LoadingState::Aborted
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::KilnError;

    #[test]
    fn stopped_and_commit_flags() {
        assert!(LoadingState::Loaded.is_stopped());
        assert!(LoadingState::Aborted.is_stopped());
        assert!(!LoadingState::PartialLoaded.is_stopped());
        assert!(LoadingState::PartialLoaded.can_commit());
        assert!(LoadingState::Loaded.can_commit());
        assert!(!LoadingState::Aborted.can_commit());
        assert!(!LoadingState::Loading.can_commit());
    }

    #[test]
    fn transitions_only_move_forward() {
        use LoadingState::*;
        assert!(LoadingState::is_valid_transition(NotLoaded, Loading));
        assert!(LoadingState::is_valid_transition(NotLoaded, Loaded));
        assert!(LoadingState::is_valid_transition(Loading, PartialLoaded));
        assert!(LoadingState::is_valid_transition(PartialLoaded, PartialLoaded));
        assert!(LoadingState::is_valid_transition(PartialLoaded, Aborted));
        assert!(!LoadingState::is_valid_transition(PartialLoaded, Loading));
        assert!(!LoadingState::is_valid_transition(Loading, NotLoaded));
        assert!(!LoadingState::is_valid_transition(Loaded, Loading));
        assert!(!LoadingState::is_valid_transition(Aborted, Loaded));
    }

    #[test]
    fn error_result_aborts() {
        let failed: KilnResult<()> = Err(KilnError::from("bad header"));
        assert_eq!(
            LoadingState::from_result(failed, LoadingState::Loaded),
            LoadingState::Aborted
        );
        assert_eq!(
            LoadingState::from_result(Ok(3), LoadingState::PartialLoaded),
            LoadingState::PartialLoaded
        );
    }
}
