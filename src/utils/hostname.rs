use nix::errno::Errno;
use nix::unistd::gethostname;
use std::ffi::OsString;

#[cfg_attr(test, mockall::automock)]
pub trait HostnameGetter {
    fn get(&self) -> Result<OsString, Errno>;
}

#[derive(Default)]
pub struct SystemHostnameGetter {}

impl HostnameGetter for SystemHostnameGetter {
    fn get(&self) -> Result<OsString, Errno> {
        gethostname()
    }
}
