//! Backend session lifecycle and recovery after execution failures.
//!
//! Every backend call made on behalf of a benchmark goes through [`Session::call`].
//! An execution failure moves the session to [`SessionState::Failed`], the backend
//! is shut down (errors ignored) and initialised again. A successful restart
//! returns the session to [`SessionState::Running`] and hands the failure back to
//! the caller, who decides whether to retry. A failed restart is terminal.

use std::fmt;

use crate::backend::Backend;
use crate::config::SessionConfig;
use crate::error::{BackendError, ExecutorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Running,
    Failed,
    Unrecoverable,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Unrecoverable => "unrecoverable",
        };
        f.write_str(name)
    }
}

/// A backend bound to one platform/device, with an explicit state machine.
pub struct Session<B: Backend> {
    backend: B,
    config: SessionConfig,
    state: SessionState,
    recoveries: usize,
}

impl<B: Backend> Session<B> {
    /// Wrap `backend` without starting it.
    pub fn new(backend: B, config: SessionConfig) -> Self {
        Self {
            backend,
            config,
            state: SessionState::Uninitialized,
            recoveries: 0,
        }
    }

    /// Wrap `backend` and start the session.
    pub fn open(backend: B, config: SessionConfig) -> Result<Self> {
        let mut session = Self::new(backend, config);
        session.init()?;
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    /// Completed restarts since the session was created.
    pub fn recoveries(&self) -> usize {
        self.recoveries
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Start the backend session. No-op when already running.
    pub fn init(&mut self) -> Result<()> {
        match self.state {
            SessionState::Running => return Ok(()),
            SessionState::Unrecoverable => {
                return Err(ExecutorError::Unrecoverable {
                    reason: "session restart previously failed".into(),
                })
            }
            SessionState::Uninitialized | SessionState::Failed => {}
        }

        let SessionConfig { platform, device } = self.config;
        match self.backend.init_session(platform, device) {
            Ok(()) => {
                tracing::info!(
                    backend = self.backend.name(),
                    platform,
                    device,
                    "session started"
                );
                self.state = SessionState::Running;
                Ok(())
            }
            Err(err) => Err(ExecutorError::SessionInit {
                platform,
                device,
                reason: err.to_string(),
            }),
        }
    }

    /// Stop the backend session. Shutdown errors are logged and dropped.
    pub fn shutdown(&mut self) {
        if self.state == SessionState::Unrecoverable {
            return;
        }
        if let Err(err) = self.backend.shutdown_session() {
            tracing::debug!(error = %err, "ignoring shutdown error");
        }
        self.state = SessionState::Uninitialized;
    }

    /// Run one backend operation.
    ///
    /// `Compile` failures and other non-execution errors pass through without a
    /// state change and are not recoverable. Execution failures trigger a restart;
    /// the operation itself is not repeated.
    pub fn call<T, F>(&mut self, op: F) -> Result<T>
    where
        F: FnOnce(&mut B) -> std::result::Result<T, BackendError>,
    {
        self.ensure_running()?;
        match op(&mut self.backend) {
            Ok(value) => Ok(value),
            Err(err) if err.is_execution_failure() => Err(self.recover(err)),
            Err(BackendError::Compile { kernel, log }) => {
                Err(ExecutorError::Compile { kernel, log })
            }
            Err(err) => Err(ExecutorError::Backend {
                reason: err.to_string(),
            }),
        }
    }

    fn ensure_running(&self) -> Result<()> {
        match self.state {
            SessionState::Running => Ok(()),
            SessionState::Unrecoverable => Err(ExecutorError::Unrecoverable {
                reason: "backend could not be restarted after an earlier failure".into(),
            }),
            state => Err(ExecutorError::SessionUnavailable { state }),
        }
    }

    fn recover(&mut self, cause: BackendError) -> ExecutorError {
        self.state = SessionState::Failed;
        tracing::warn!(
            backend = self.backend.name(),
            error = %cause,
            "runtime error in the executor, restarting session"
        );

        if let Err(err) = self.backend.shutdown_session() {
            tracing::debug!(error = %err, "ignoring shutdown error during recovery");
        }

        let SessionConfig { platform, device } = self.config;
        match self.backend.init_session(platform, device) {
            Ok(()) => {
                self.state = SessionState::Running;
                self.recoveries += 1;
                tracing::info!(recoveries = self.recoveries, "session restarted");
                ExecutorError::Execution {
                    reason: cause.to_string(),
                }
            }
            Err(err) => {
                self.state = SessionState::Unrecoverable;
                tracing::error!(
                    error = %err,
                    "catastrophic failure, cannot restart the executor"
                );
                ExecutorError::Unrecoverable {
                    reason: format!("{cause}; restart failed: {err}"),
                }
            }
        }
    }
}

impl<B: Backend> Drop for Session<B> {
    fn drop(&mut self) {
        if self.state == SessionState::Running {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{DeviceArg, KernelArg};
    use crate::backend::DeviceInfo;
    use crate::geometry::Geometry;
    use crate::timing::KernelTime;

    struct NoArg;

    impl DeviceArg for NoArg {
        fn byte_len(&self) -> usize {
            0
        }
        fn clear(&mut self) {}
        fn release(&mut self) {}
    }

    /// Counts lifecycle calls; init fails once `inits` reaches `fail_init_at`.
    #[derive(Default)]
    struct Lifecycle {
        inits: usize,
        shutdowns: usize,
        fail_init_at: Option<usize>,
        fail_shutdown: bool,
    }

    impl Backend for Lifecycle {
        type Kernel = ();
        type Arg = NoArg;

        fn name(&self) -> &'static str {
            "lifecycle"
        }

        fn init_session(
            &mut self,
            platform: usize,
            device: usize,
        ) -> std::result::Result<(), BackendError> {
            self.inits += 1;
            if self.fail_init_at == Some(self.inits) {
                return Err(BackendError::Init {
                    platform,
                    device,
                    reason: "gone".into(),
                });
            }
            Ok(())
        }

        fn shutdown_session(&mut self) -> std::result::Result<(), BackendError> {
            self.shutdowns += 1;
            if self.fail_shutdown {
                return Err(BackendError::Shutdown("stuck".into()));
            }
            Ok(())
        }

        fn compile(&mut self, _: &str, _: &str, _: &str) -> std::result::Result<(), BackendError> {
            Ok(())
        }

        fn create_arg(&mut self, _: &KernelArg) -> std::result::Result<NoArg, BackendError> {
            Ok(NoArg)
        }

        fn execute_once(
            &mut self,
            _: &(),
            _: &Geometry,
            _: &mut [NoArg],
        ) -> std::result::Result<KernelTime, BackendError> {
            Ok(KernelTime::ZERO)
        }

        fn device_info(&self) -> std::result::Result<DeviceInfo, BackendError> {
            Err(BackendError::Unsupported {
                backend: "lifecycle",
                what: "device_info".into(),
            })
        }
    }

    fn fault() -> std::result::Result<(), BackendError> {
        Err(BackendError::Execution("device fault".into()))
    }

    #[test]
    fn call_requires_running_session() {
        let mut session = Session::new(Lifecycle::default(), SessionConfig::default());
        let err = session.call(|_| Ok(())).unwrap_err();
        assert_eq!(
            err,
            ExecutorError::SessionUnavailable {
                state: SessionState::Uninitialized,
            }
        );
    }

    #[test]
    fn execution_failure_restarts_session() {
        let mut session = Session::open(Lifecycle::default(), SessionConfig::default()).unwrap();
        let err = session.call(|_| fault()).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.recoveries(), 1);
        assert_eq!(session.backend().inits, 2);
        assert_eq!(session.backend().shutdowns, 1);
        assert!(session.call(|_| Ok(42)).is_ok());
    }

    #[test]
    fn shutdown_errors_are_suppressed_during_recovery() {
        let backend = Lifecycle {
            fail_shutdown: true,
            ..Default::default()
        };
        let mut session = Session::open(backend, SessionConfig::default()).unwrap();
        let err = session.call(|_| fault()).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(session.state(), SessionState::Running);
    }

    #[test]
    fn failed_restart_is_terminal() {
        let backend = Lifecycle {
            fail_init_at: Some(2),
            ..Default::default()
        };
        let mut session = Session::open(backend, SessionConfig::default()).unwrap();
        let err = session.call(|_| fault()).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(session.state(), SessionState::Unrecoverable);

        let inits = session.backend().inits;
        assert!(session.call(|_| Ok(())).unwrap_err().is_fatal());
        assert!(session.init().unwrap_err().is_fatal());
        assert_eq!(session.backend().inits, inits);
    }

    #[test]
    fn compile_errors_do_not_restart() {
        let mut session = Session::open(Lifecycle::default(), SessionConfig::default()).unwrap();
        let err = session
            .call(|_| -> std::result::Result<(), BackendError> {
                Err(BackendError::Compile {
                    kernel: "k".into(),
                    log: "syntax".into(),
                })
            })
            .unwrap_err();
        assert_eq!(
            err,
            ExecutorError::Compile {
                kernel: "k".into(),
                log: "syntax".into(),
            }
        );
        assert_eq!(session.recoveries(), 0);
        assert_eq!(session.backend().inits, 1);
    }

    #[test]
    fn unsupported_operation_is_not_reported_as_recovered() {
        let mut session = Session::open(Lifecycle::default(), SessionConfig::default()).unwrap();
        let err = session.call(|backend| backend.device_info()).unwrap_err();

        assert_eq!(
            err,
            ExecutorError::Backend {
                reason: "unsupported by lifecycle backend: device_info".into(),
            }
        );
        assert!(!err.is_recoverable());
        assert!(!err.is_fatal());
        assert!(err.size_failure().is_none());
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.recoveries(), 0);
        assert_eq!(session.backend().inits, 1);
        assert_eq!(session.backend().shutdowns, 0);
    }

    #[test]
    fn initial_init_failure_is_reported() {
        let backend = Lifecycle {
            fail_init_at: Some(1),
            ..Default::default()
        };
        let err = Session::open(backend, SessionConfig::new(2, 3))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ExecutorError::SessionInit {
                platform: 2,
                device: 3,
                ..
            }
        ));
    }
}
