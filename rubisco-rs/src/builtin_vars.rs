//! Variables every rubisco process starts with.
//!
//! | Name | Value |
//! |------|-------|
//! | `home` | user home directory |
//! | `cwd` | working directory at start-up |
//! | `nproc` | available parallelism |
//! | `rubisco.version` | crate version |
//! | `rubisco.command` | how the running program was invoked |
//! | `host.os` | `unix` or `windows` |
//! | `host.system` | operating system, e.g. `linux` |
//! | `host.machine` | CPU architecture, e.g. `x86_64` |
//! | `host.node`, `host.release`, `host.version` | `uname` fields (Unix only) |
//!
//! `env.NAME` is not pushed up front; see [`register_env_callback`].

use directories::BaseDirs;

use crate::script::Value;
use crate::var::VarStore;

const ENV_PREFIX: &str = "env.";

/// Push the built-in variables onto `store`.
pub fn init_builtin_vars(store: &mut VarStore) {
    let home = BaseDirs::new()
        .map(|dirs| dirs.home_dir().display().to_string())
        .unwrap_or_default();
    store.push("home", home);

    match std::env::current_dir() {
        Ok(cwd) => store.push("cwd", cwd.display().to_string()),
        Err(e) => log::warn!("cannot determine working directory: {e}"),
    }

    let nproc = std::thread::available_parallelism().map_or(1, |n| n.get());
    store.push("nproc", nproc);

    store.push("rubisco.version", env!("CARGO_PKG_VERSION"));
    let command = std::env::args().next().unwrap_or_else(|| "rubisco".to_string());
    store.push("rubisco.command", command);

    store.push("host.os", std::env::consts::FAMILY);
    store.push("host.system", std::env::consts::OS);
    store.push("host.machine", std::env::consts::ARCH);

    #[cfg(unix)]
    if let Some(uts) = uname() {
        store.push("host.node", uts.node);
        store.push("host.release", uts.release);
        store.push("host.version", uts.version);
    }
}

/// Resolve `env.NAME` from the process environment on first reference.
///
/// Unset variables stay undefined so that a fallback can apply.
pub fn register_env_callback(store: &mut VarStore) {
    store.add_undefined_callback(|store: &mut VarStore, name: &str| {
        let Some(key) = name.strip_prefix(ENV_PREFIX) else {
            return;
        };
        if let Ok(value) = std::env::var(key) {
            log::trace!("materialising {name} from the environment");
            store.push(name, Value::Str(value));
        }
    });
}

#[cfg(unix)]
struct Uname {
    node: String,
    release: String,
    version: String,
}

#[cfg(unix)]
fn uname() -> Option<Uname> {
    use std::ffi::CStr;

    fn field(raw: &[libc::c_char]) -> String {
        // SAFETY: uname(2) NUL-terminates every field it fills.
        unsafe { CStr::from_ptr(raw.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    // SAFETY: utsname is plain old data; zeroed is a valid initial state.
    let mut buf: libc::utsname = unsafe { std::mem::zeroed() };
    // SAFETY: buf is a valid, writable utsname.
    if unsafe { libc::uname(&mut buf) } != 0 {
        return None;
    }
    Some(Uname {
        node: field(&buf.nodename),
        release: field(&buf.release),
        version: field(&buf.version),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
