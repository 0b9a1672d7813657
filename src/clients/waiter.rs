// Copyright 2018 Dmitry Tantsur <divius.inside@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Waiters.

use std::fmt;
use std::time::Duration;

use waiter::{Waiter, WaiterCurrentState};

use crate::{Error, ErrorKind, Result};

/// Wait for resource deletion.
///
/// `refresh` is expected to fail with `ResourceNotFound` once the resource is
/// gone.
pub struct DeletionWaiter<F> {
    description: String,
    refresh: F,
    wait_timeout: Duration,
    delay: Duration,
}

impl<F> DeletionWaiter<F>
where
    F: FnMut() -> Result<()>,
{
    pub(crate) fn new<S: Into<String>>(
        description: S,
        refresh: F,
        wait_timeout: Duration,
        delay: Duration,
    ) -> DeletionWaiter<F> {
        DeletionWaiter {
            description: description.into(),
            refresh,
            wait_timeout,
            delay,
        }
    }
}

impl<F> fmt::Debug for DeletionWaiter<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DeletionWaiter")
            .field("description", &self.description)
            .field("wait_timeout", &self.wait_timeout)
            .field("delay", &self.delay)
            .finish()
    }
}

impl<F> WaiterCurrentState<String> for DeletionWaiter<F> {
    fn waiter_current_state(&self) -> &String {
        &self.description
    }
}

impl<F> Waiter<(), Error> for DeletionWaiter<F>
where
    F: FnMut() -> Result<()>,
{
    fn default_wait_timeout(&self) -> Option<Duration> {
        Some(self.wait_timeout)
    }

    fn default_delay(&self) -> Duration {
        self.delay
    }

    fn timeout_error(&self) -> Error {
        Error::new(
            ErrorKind::OperationTimedOut,
            format!(
                "Timeout waiting for resource {} to be deleted",
                self.description
            ),
        )
    }

    fn poll(&mut self) -> Result<Option<()>> {
        match (self.refresh)() {
            Ok(..) => {
                trace!(
                    "Still waiting for resource {} to be deleted",
                    self.description
                );
                Ok(None)
            }
            Err(ref e) if e.kind() == ErrorKind::ResourceNotFound => {
                debug!("Resource {} was deleted", self.description);
                Ok(Some(()))
            }
            Err(e) => {
                debug!("Failed to delete resource {} - {}", self.description, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub mod test {
    use std::cell::Cell;
    use std::time::Duration;

    use waiter::{Waiter, WaiterCurrentState};

    use super::DeletionWaiter;
    use crate::{Error, ErrorKind};

    #[test]
    fn test_deleted_after_polls() {
        let calls = Cell::new(0);
        let waiter = DeletionWaiter::new(
            "sg1",
            || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Ok(())
                } else {
                    Err(Error::new(ErrorKind::ResourceNotFound, "gone"))
                }
            },
            Duration::from_secs(5),
            Duration::from_millis(1),
        );
        waiter.wait().unwrap();
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_timeout() {
        let waiter = DeletionWaiter::new(
            "sg1",
            || Ok(()),
            Duration::from_millis(5),
            Duration::from_millis(2),
        );
        assert_eq!(waiter.waiter_current_state(), "sg1");
        assert_eq!(waiter.wait().unwrap_err().kind(), ErrorKind::OperationTimedOut);
    }

    #[test]
    fn test_poll_directly() {
        let calls = Cell::new(0);
        let mut waiter = DeletionWaiter::new(
            "sg1",
            || {
                calls.set(calls.get() + 1);
                if calls.get() < 2 {
                    Ok(())
                } else {
                    Err(Error::new(ErrorKind::ResourceNotFound, "gone"))
                }
            },
            Duration::from_secs(60),
            Duration::from_secs(2),
        );
        assert_eq!(waiter.default_wait_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(waiter.default_delay(), Duration::from_secs(2));
        assert_eq!(waiter.poll().unwrap(), None);
        assert_eq!(waiter.poll().unwrap(), Some(()));
        assert_eq!(waiter.timeout_error().kind(), ErrorKind::OperationTimedOut);
    }

    #[test]
    fn test_other_error() {
        let waiter = DeletionWaiter::new(
            "sg1",
            || Err(Error::new(ErrorKind::AccessDenied, "nope")),
            Duration::from_secs(5),
            Duration::from_millis(1),
        );
        assert_eq!(waiter.wait().unwrap_err().kind(), ErrorKind::AccessDenied);
    }
}
