pub mod sys {
    use std::env;
    use tracing::error;

    const HOSTNAME_ENV: &str = "MYSRV_POD_NAME";
    const NONE_HOSTNAME: &str = "_NONE_HOSTNAME";

    #[cfg(unix)]
    #[inline]
    pub fn hostname() -> String {
        env::var(HOSTNAME_ENV).unwrap_or_else(|_e| {
            use libc::{c_char, sysconf, _SC_HOST_NAME_MAX};
            use std::os::unix::ffi::OsStringExt;
            // Get the maximum size of host names on this system, and account for the
            // trailing NUL byte.
            let hostname_max = unsafe { sysconf(_SC_HOST_NAME_MAX) };
            let mut buffer = vec![0; (hostname_max.max(255) as usize) + 1];
            let status_code =
                unsafe { libc::gethostname(buffer.as_mut_ptr() as *mut c_char, buffer.len()) };
            if status_code != 0 {
                error!(
                    "Failed to get hostname {:?}",
                    std::io::Error::last_os_error()
                );
                NONE_HOSTNAME.to_string()
            } else {
                let end = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
                buffer.resize(end, 0);
                std::ffi::OsString::from_vec(buffer)
                    .into_string()
                    .unwrap_or_else(|_| NONE_HOSTNAME.to_string())
            }
        })
    }

    #[cfg(not(unix))]
    #[inline]
    pub fn hostname() -> String {
        env::var(HOSTNAME_ENV)
            .or_else(|_| env::var("COMPUTERNAME"))
            .unwrap_or_else(|_| NONE_HOSTNAME.to_string())
    }

    #[cfg(test)]
    mod tests {
        #[test]
        fn test_hostname_is_not_empty() {
            assert!(!super::hostname().is_empty());
        }
    }
}
