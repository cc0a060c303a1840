use std::path::{Path, PathBuf};

pub const DAEMON_SOCKET: &str = "daemon.sock";

/// `<home>/.grant-tracker`
pub fn tracker_root(home: &Path) -> PathBuf {
    tracker_core::config::tracker_dir_at(home)
}

pub fn socket_path(home: &Path) -> PathBuf {
    tracker_root(home).join(DAEMON_SOCKET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_lives_next_to_config() {
        let home = Path::new("/home/ada");
        assert_eq!(
            socket_path(home),
            PathBuf::from("/home/ada/.grant-tracker/daemon.sock")
        );
        assert_eq!(
            socket_path(home).parent(),
            tracker_core::config::config_path_at(home).parent()
        );
    }
}
