use log::info;

/// 系统负载采样
pub trait LoadProbe: Send {
    /// Memory in use, 0-100. `None` when the platform gives no reading.
    fn memory_load_percent(&mut self) -> Option<f32>;
}

/// Reads `/proc/meminfo` on Linux; no reading elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMemoryProbe;

impl LoadProbe for SystemMemoryProbe {
    #[cfg(target_os = "linux")]
    fn memory_load_percent(&mut self) -> Option<f32> {
        let text = std::fs::read_to_string("/proc/meminfo").ok()?;
        memory_load_from_meminfo(&text)
    }

    #[cfg(not(target_os = "linux"))]
    fn memory_load_percent(&mut self) -> Option<f32> {
        None
    }
}

/// Used memory as a percentage of `MemTotal`, counting `MemAvailable`
/// (page cache and reclaimable slab included) as free.
pub fn memory_load_from_meminfo(text: &str) -> Option<f32> {
    let mut total = None;
    let mut available = None;
    for line in text.lines() {
        let mut parts = line.split_whitespace();
        let slot = match parts.next() {
            Some("MemTotal:") => &mut total,
            Some("MemAvailable:") => &mut available,
            _ => continue,
        };
        *slot = parts.next().and_then(|kb| kb.parse::<u64>().ok());
    }

    let total = total.filter(|&t| t > 0)? as f64;
    let available = (available? as f64).min(total);
    Some(((total - available) / total * 100.0) as f32)
}

/// Fixed reading, for tests and for disabling adaptation.
#[derive(Debug, Clone, Copy)]
pub struct StaticLoadProbe(pub Option<f32>);

impl LoadProbe for StaticLoadProbe {
    fn memory_load_percent(&mut self) -> Option<f32> {
        self.0
    }
}

/// 高负载时跳帧：>80% 每 4 帧取 1，>60% 每 2 帧取 1
pub fn skip_factor_for_load(load_percent: f32) -> u32 {
    if load_percent > 80.0 {
        4
    } else if load_percent > 60.0 {
        2
    } else {
        1
    }
}

/// Adaptive frame skipping driven by periodic load samples.
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    skip_factor: u32,
    sample_interval: u64,
    frames_seen: u64,
}

impl FrameThrottle {
    pub fn new(sample_interval: u64) -> Self {
        Self {
            skip_factor: 1,
            sample_interval: sample_interval.max(1),
            frames_seen: 0,
        }
    }

    pub fn skip_factor(&self) -> u32 {
        self.skip_factor
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Count one captured frame; returns whether it should be delivered.
    /// Every `sample_interval` frames the probe is read and the skip factor
    /// recomputed.
    pub fn on_frame(&mut self, probe: &mut dyn LoadProbe) -> bool {
        self.frames_seen += 1;
        let deliver = self.frames_seen % self.skip_factor as u64 == 0;

        if self.frames_seen % self.sample_interval == 0 {
            if let Some(load) = probe.memory_load_percent() {
                let factor = skip_factor_for_load(load);
                if factor != self.skip_factor {
                    info!(
                        "⚙️ Memory load {:.0}%, delivering 1 of every {} frame(s)",
                        load, factor
                    );
                    self.skip_factor = factor;
                }
            }
        }

        deliver
    }
}

impl Default for FrameThrottle {
    fn default() -> Self {
        Self::new(100)
    }
}
