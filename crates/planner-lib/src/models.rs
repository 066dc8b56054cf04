//! Core data models for the capacity planner

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Utilization target applied when a cluster does not configure one
pub const DEFAULT_UTILIZATION_TARGET: f64 = 85.0;

/// Lowest utilization target accepted by configuration validation
pub const MIN_UTILIZATION_TARGET: f64 = 50.0;

/// Highest utilization target accepted by configuration validation
pub const MAX_UTILIZATION_TARGET: f64 = 95.0;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
const KB_PER_GB: u64 = 1024 * 1024;

/// A CPU / memory / storage capacity triple.
///
/// Used for cluster total, allocated and available figures. Storage is kept
/// fractional since it is derived from byte and kilobyte counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceCapacity {
    pub cpu_cores: u64,
    pub cpu_mhz: u64,
    pub memory_mb: u64,
    pub storage_gb: f64,
}

/// Rolled-up capacity of a cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterCapacity {
    pub total: ResourceCapacity,
    pub allocated: ResourceCapacity,
    pub available: ResourceCapacity,
}

/// Percentage of total capacity that may be counted as usable
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UtilizationTarget {
    #[serde(default = "default_target")]
    pub cpu: f64,
    #[serde(default = "default_target")]
    pub memory: f64,
    #[serde(default = "default_target")]
    pub storage: f64,
}

fn default_target() -> f64 {
    DEFAULT_UTILIZATION_TARGET
}

impl Default for UtilizationTarget {
    fn default() -> Self {
        Self {
            cpu: DEFAULT_UTILIZATION_TARGET,
            memory: DEFAULT_UTILIZATION_TARGET,
            storage: DEFAULT_UTILIZATION_TARGET,
        }
    }
}

impl UtilizationTarget {
    /// Returns the name of the first dimension outside the accepted range
    pub fn out_of_range(&self) -> Option<(&'static str, f64)> {
        [("cpu", self.cpu), ("memory", self.memory), ("storage", self.storage)]
            .into_iter()
            .find(|(_, v)| !(MIN_UTILIZATION_TARGET..=MAX_UTILIZATION_TARGET).contains(v))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfiguration {
    #[serde(default)]
    pub utilization_target: UtilizationTarget,
}

/// A pool of hypervisor hosts sharing a capacity budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    pub organization_id: String,
    #[serde(default)]
    pub configuration: ClusterConfiguration,
    #[serde(default)]
    pub capacity: ClusterCapacity,
    #[serde(default)]
    pub host_count: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Disconnected,
    NotResponding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Standby,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datastore {
    pub name: String,
    pub capacity_bytes: u64,
    #[serde(default)]
    pub free_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostCapacity {
    pub cpu_cores: u32,
    pub cpu_mhz: u64,
    pub memory_mb: u64,
    #[serde(default)]
    pub datastores: Vec<Datastore>,
}

impl HostCapacity {
    /// Aggregated datastore capacity in GB
    pub fn storage_gb(&self) -> f64 {
        let bytes: u64 = self.datastores.iter().map(|d| d.capacity_bytes).sum();
        bytes as f64 / BYTES_PER_GB
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HostUtilization {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub storage_percent: f64,
}

/// A single hypervisor node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub id: String,
    pub name: String,
    pub cluster_id: String,
    pub capacity: HostCapacity,
    #[serde(default)]
    pub utilization: HostUtilization,
    pub connection_state: ConnectionState,
    pub power_state: PowerState,
    #[serde(default)]
    pub maintenance_mode: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Host {
    /// Only connected, powered-on hosts outside maintenance contribute capacity
    pub fn is_eligible(&self) -> bool {
        self.is_active
            && self.connection_state == ConnectionState::Connected
            && self.power_state == PowerState::PoweredOn
            && !self.maintenance_mode
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VdiStatus {
    Active,
    Inactive,
    Provisioning,
    Maintenance,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuAllocation {
    pub cores: u32,
    #[serde(default)]
    pub reserved_mhz: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryAllocation {
    pub allocated_mb: u64,
    #[serde(default)]
    pub reservation_mb: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageAllocation {
    /// Provisioned disk in kilobytes, as reported by the hypervisor
    pub allocated_kb: u64,
}

impl StorageAllocation {
    pub fn gb(&self) -> f64 {
        self.allocated_kb as f64 / KB_PER_GB as f64
    }

    /// Whole GB, rounded down
    pub fn whole_gb(&self) -> u64 {
        self.allocated_kb / KB_PER_GB
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuAllocation {
    pub count: u32,
    pub vendor: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAllocation {
    pub cpu: CpuAllocation,
    pub memory: MemoryAllocation,
    pub storage: StorageAllocation,
    #[serde(default)]
    pub gpu: Option<GpuAllocation>,
}

/// A provisioned virtual desktop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vdi {
    pub id: String,
    pub name: String,
    pub organization_id: String,
    /// Name of the host the VM is placed on
    pub esxi_host: String,
    pub status: VdiStatus,
    pub resource_allocation: ResourceAllocation,
    #[serde(default)]
    pub assigned_user: Option<String>,
}

impl Vdi {
    pub fn is_active(&self) -> bool {
        self.status == VdiStatus::Active
    }
}

/// One utilization reading for a VM, percentages in 0-100
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationSample {
    pub vdi_id: String,
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub storage_percent: f64,
}

/// Resource footprint defining a profile's equivalence class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpecs {
    pub cpu_cores: u32,
    pub cpu_mhz: u64,
    pub memory_mb: u64,
    pub storage_gb: u64,
}

/// A VM currently matching a profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileInstance {
    pub vdi_id: String,
    pub name: String,
    #[serde(default)]
    pub assigned_user: Option<String>,
    pub status: VdiStatus,
    pub esxi_host: String,
}

impl From<&Vdi> for ProfileInstance {
    fn from(vdi: &Vdi) -> Self {
        Self {
            vdi_id: vdi.id.clone(),
            name: vdi.name.clone(),
            assigned_user: vdi.assigned_user.clone(),
            status: vdi.status,
            esxi_host: vdi.esxi_host.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileAllocation {
    pub current: u32,
    pub maximum: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageFigures {
    pub cpu: f64,
    pub memory: f64,
    pub storage: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUtilizationStats {
    pub average: UsageFigures,
    pub peak: UsageFigures,
    /// Ranking signal in 0-100, peaks at 50% average CPU usage
    pub efficiency: f64,
}

/// Equivalence class of VMs with near-identical resource specs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationProfile {
    pub id: String,
    pub name: String,
    pub organization_id: String,
    pub cluster_id: String,
    pub resource_specs: ResourceSpecs,
    #[serde(default)]
    pub instances: Vec<ProfileInstance>,
    #[serde(default)]
    pub allocation: ProfileAllocation,
    #[serde(default)]
    pub auto_generated: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub utilization_stats: ProfileUtilizationStats,
    #[serde(default)]
    pub last_calculated: Option<DateTime<Utc>>,
}

impl AllocationProfile {
    /// Replace the member list wholesale and keep the current count in step
    pub fn replace_instances(&mut self, instances: Vec<ProfileInstance>) {
        self.allocation.current = instances.len() as u32;
        self.instances = instances;
    }

    /// Additional instances that still fit into the cluster
    pub fn available_slots(&self) -> u32 {
        self.allocation.maximum.saturating_sub(self.allocation.current)
    }
}
