// SPDX-License-Identifier: GPL-3.0-only

//! End-to-end update flow against a stateful in-memory runner:
//! create a VG, a thin base volume inside a pool, protect it, snapshot
//! it, and unprotect it again.

use std::sync::Mutex;

use imglayer_lvm::{
    CommandRunner, LogicalVolume, Lvm, LvmCommand, Permission, Result, ThinPool, VolumeGroup,
};

#[derive(Default)]
struct VolumeState {
    read_only: bool,
    skip_activation: bool,
    inactive: bool,
}

/// Tracks permission/activation state the way the real tools would, so
/// property reads observe the effect of earlier changes.
#[derive(Default)]
struct StatefulRunner {
    state: Mutex<VolumeState>,
}

impl StatefulRunner {
    fn apply_lvchange(&self, args: &[&str]) {
        let mut state = self.state.lock().unwrap();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match *arg {
                "--permission" => state.read_only = iter.next() == Some(&"r"),
                "--setactivationskip" => state.skip_activation = iter.next() == Some(&"y"),
                "--activate" => state.inactive = iter.next() == Some(&"n"),
                _ => {}
            }
        }
    }

    fn report(&self, args: &[&str]) -> String {
        let state = self.state.lock().unwrap();
        let field = args
            .iter()
            .position(|a| *a == "-o")
            .and_then(|pos| args.get(pos + 1))
            .copied()
            .unwrap_or_default();
        let value = match field {
            "lv_permissions" => {
                if state.read_only {
                    "read-only"
                } else {
                    "writeable"
                }
            }
            "lv_active" => {
                if state.inactive {
                    ""
                } else {
                    "active"
                }
            }
            "lv_skip_activation" => {
                if state.skip_activation {
                    "skip activation"
                } else {
                    ""
                }
            }
            _ => "",
        };
        value.to_string()
    }
}

impl CommandRunner for StatefulRunner {
    fn invoke(&self, command: LvmCommand, args: &[&str]) -> Result<String> {
        match command {
            LvmCommand::Lvchange => {
                self.apply_lvchange(args);
                Ok(String::new())
            }
            LvmCommand::Lvs | LvmCommand::Vgs => Ok(self.report(args)),
            _ => Ok(String::new()),
        }
    }

    fn run(&self, _program: &str, _args: &[&str]) -> Result<String> {
        Ok(String::new())
    }
}

#[test]
fn base_layer_lifecycle() {
    let lvm = Lvm::with_runner(StatefulRunner::default());

    let vg = VolumeGroup::create(&lvm, "HostVG", &["/dev/sda1"]).unwrap();
    assert_eq!(vg.name(), "HostVG");

    let pool = ThinPool::from(LogicalVolume::from_lv_name(&lvm, "HostVG", "pool0"));
    let base = pool.create_thin_volume("Base-0", "10G").unwrap();
    assert_eq!(base.qualified_name(), "HostVG/Base-0");

    base.protect().unwrap();
    assert_eq!(base.permission().unwrap(), Permission::ReadOnly);
    assert!(!base.is_active().unwrap());
    assert!(base.activation_skip().unwrap());

    let snapshot = base.create_snapshot("Base-1").unwrap();
    let registered: Vec<String> = lvm
        .registered_volumes()
        .iter()
        .map(|lv| lv.qualified_name())
        .collect();
    assert!(registered.contains(&snapshot.qualified_name()));

    base.unprotect().unwrap();
    assert_eq!(base.permission().unwrap(), Permission::ReadWrite);
    assert!(base.is_active().unwrap());
    assert!(!base.activation_skip().unwrap());
}
