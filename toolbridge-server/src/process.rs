// Copyright 2025 Sushanth (https://github.com/sushanthpy)
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

//! Process statistics for the running server.
//!
//! Keeps one `sysinfo::System` alive so successive CPU readings have a
//! baseline to diff against.

use parking_lot::Mutex;
use serde::Serialize;
use std::time::Instant;
use sysinfo::{Pid, ProcessesToUpdate, System};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub rss_bytes: u64,
    pub virtual_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStats {
    pub pid: u32,
    pub memory: MemoryStats,
    pub cpu_percent: f32,
}

pub struct ProcessMonitor {
    system: Mutex<System>,
    pid: Pid,
    started_at: Instant,
}

impl ProcessMonitor {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: Pid::from_u32(std::process::id()),
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Fresh snapshot. Fields are zero if the process cannot be read.
    pub fn snapshot(&self) -> ProcessStats {
        let mut system = self.system.lock();
        let _ = system.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        match system.process(self.pid) {
            Some(process) => ProcessStats {
                pid: self.pid.as_u32(),
                memory: MemoryStats {
                    rss_bytes: process.memory(),
                    virtual_bytes: process.virtual_memory(),
                },
                cpu_percent: process.cpu_usage(),
            },
            None => {
                tracing::debug!("Process {} not visible to sysinfo", self.pid);
                ProcessStats {
                    pid: self.pid.as_u32(),
                    ..ProcessStats::default()
                }
            }
        }
    }
}

impl Default for ProcessMonitor {
    fn default() -> Self {
        Self::new()
    }
}

pub fn platform() -> &'static str {
    std::env::consts::OS
}

pub fn arch() -> &'static str {
    std::env::consts::ARCH
}
