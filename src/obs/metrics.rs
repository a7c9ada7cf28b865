use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Registry of the metrics exposed by the query layer.
///
/// Components register their counters and gauges at construction time;
/// embedders read them back by name.
#[derive(Default, Clone)]
pub struct MetricRegistry {
    counters: BTreeMap<String, Arc<Counter>>,
    gauges: BTreeMap<String, Arc<dyn Gauge>>,
    computed: BTreeMap<String, Arc<dyn Computed>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_counter(&mut self, name: &str, counter: &Arc<Counter>) -> &mut Self {
        self.counters.insert(name.to_string(), counter.clone());
        self
    }

    pub fn register_gauge(&mut self, name: &str, gauge: &Arc<dyn Gauge>) -> &mut Self {
        self.gauges.insert(name.to_string(), gauge.clone());
        self
    }

    pub fn register_computed(&mut self, name: &str, computed: &Arc<dyn Computed>) -> &mut Self {
        self.computed.insert(name.to_string(), computed.clone());
        self
    }

    pub fn get_counter(&self, name: &str) -> Option<Arc<Counter>> {
        self.counters.get(name).cloned()
    }

    pub fn get_gauge(&self, name: &str) -> Option<Arc<dyn Gauge>> {
        self.gauges.get(name).cloned()
    }

    pub fn get_computed(&self, name: &str) -> Option<Arc<dyn Computed>> {
        self.computed.get(name).cloned()
    }
}

#[derive(Default)]
pub struct Counter {
    atomic: AtomicU64,
}

impl Counter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the current value of the counter.
    pub fn get(&self) -> u64 {
        self.atomic.load(Ordering::Relaxed)
    }

    /// Increments the counter by one.
    pub fn inc(&self) {
        self.atomic.fetch_add(1, Ordering::Relaxed);
    }
}

pub trait Gauge: Send + Sync {
    /// Returns the current value of the gauge as an `u64`.
    fn get(&self) -> u64;
}

/// A gauge whose value is computed on demand from a closure.
pub struct DerivedGauge {
    compute: Arc<dyn Fn() -> u64 + Send + Sync>,
}

impl DerivedGauge {
    pub fn new(compute: Arc<dyn Fn() -> u64 + Send + Sync>) -> Arc<Self> {
        Arc::new(Self { compute })
    }
}

impl Gauge for DerivedGauge {
    fn get(&self) -> u64 {
        (self.compute)()
    }
}

pub trait Computed: Send + Sync {
    /// Returns the current computed value as an `f64`.
    fn get(&self) -> f64;
}

/// Ratio of hits to total lookups, derived from two counters.
pub struct HitRatio {
    hit_counter: Arc<Counter>,
    miss_counter: Arc<Counter>,
}

impl HitRatio {
    pub fn new(hit_counter: Arc<Counter>, miss_counter: Arc<Counter>) -> Arc<Self> {
        Arc::new(Self {
            hit_counter,
            miss_counter,
        })
    }
}

impl Computed for HitRatio {
    fn get(&self) -> f64 {
        let h = self.hit_counter.get() as f64;
        let m = self.miss_counter.get() as f64;
        if h + m == 0.0 {
            0.0
        } else {
            h / (h + m)
        }
    }
}
