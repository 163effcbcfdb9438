use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub routing: RouterConfig,
    #[serde(default)]
    pub input: InputConfig,
}

/// Tuning for the rip-up/reroute loop and layer assignment. The defaults reproduce the
/// standard escalation schedule.
#[derive(Debug, Deserialize, Clone)]
pub struct RouterConfig {
    #[serde(default = "default_allow_overflow")]
    pub allow_overflow: bool,
    #[serde(default = "default_maze_round")]
    pub maze_round: usize,
    #[serde(default = "default_lv_iterations")]
    pub lv_iterations: usize,
    #[serde(default = "default_stagnation_limit")]
    pub stagnation_limit: usize,
    #[serde(default = "default_overflow_floor")]
    pub overflow_floor: u64,
    #[serde(default = "default_cost_height")]
    pub cost_height: f64,
    #[serde(default = "default_logistic_coef")]
    pub logistic_coef: f64,
    #[serde(default = "default_slope")]
    pub slope: f64,
    #[serde(default = "default_via_cost")]
    pub via_cost: f64,
    #[serde(default = "default_layer_via_cost")]
    pub layer_via_cost: f64,
    #[serde(default = "default_enlarge")]
    pub enlarge: u32,
    #[serde(default = "default_ripup_threshold")]
    pub ripup_threshold: i32,
    #[serde(default = "default_mazeedge_threshold")]
    pub mazeedge_threshold: u32,
    #[serde(default = "default_ordering")]
    pub ordering: bool,
    #[serde(default = "default_z_route_rounds")]
    pub z_route_rounds: usize,
    #[serde(default = "default_monotonic_threshold")]
    pub monotonic_threshold: u32,
    #[serde(default = "default_big_overflow")]
    pub big_overflow: u32,
    #[serde(default = "default_huge_overflow")]
    pub huge_overflow: u64,
    #[serde(default = "default_aggressive_logistic_coef")]
    pub aggressive_logistic_coef: f64,
    #[serde(default = "default_history_decay")]
    pub history_decay: f32,
    #[serde(default)]
    pub max_segment_length: Vec<u32>,
    #[serde(default)]
    pub threads: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            allow_overflow: default_allow_overflow(),
            maze_round: default_maze_round(),
            lv_iterations: default_lv_iterations(),
            stagnation_limit: default_stagnation_limit(),
            overflow_floor: default_overflow_floor(),
            cost_height: default_cost_height(),
            logistic_coef: default_logistic_coef(),
            slope: default_slope(),
            via_cost: default_via_cost(),
            layer_via_cost: default_layer_via_cost(),
            enlarge: default_enlarge(),
            ripup_threshold: default_ripup_threshold(),
            mazeedge_threshold: default_mazeedge_threshold(),
            ordering: default_ordering(),
            z_route_rounds: default_z_route_rounds(),
            monotonic_threshold: default_monotonic_threshold(),
            big_overflow: default_big_overflow(),
            huge_overflow: default_huge_overflow(),
            aggressive_logistic_coef: default_aggressive_logistic_coef(),
            history_decay: default_history_decay(),
            max_segment_length: Vec::new(),
            threads: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_benchmark")]
    pub benchmark: String,
    #[serde(default = "default_output_routes")]
    pub output_routes: String,
    #[serde(default)]
    pub heatmap: Option<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            benchmark: default_benchmark(),
            output_routes: default_output_routes(),
            heatmap: None,
        }
    }
}

fn default_allow_overflow() -> bool {
    true
}

fn default_maze_round() -> usize {
    500
}

fn default_lv_iterations() -> usize {
    3
}

fn default_stagnation_limit() -> usize {
    30
}

fn default_overflow_floor() -> u64 {
    50
}

fn default_cost_height() -> f64 {
    4.0
}

fn default_logistic_coef() -> f64 {
    0.7
}

fn default_slope() -> f64 {
    20.0
}

fn default_via_cost() -> f64 {
    2.0
}

fn default_layer_via_cost() -> f64 {
    1.0
}

fn default_enlarge() -> u32 {
    15
}

fn default_ripup_threshold() -> i32 {
    0
}

fn default_mazeedge_threshold() -> u32 {
    10
}

fn default_ordering() -> bool {
    true
}

fn default_z_route_rounds() -> usize {
    1
}

fn default_monotonic_threshold() -> u32 {
    1
}

fn default_big_overflow() -> u32 {
    700
}

fn default_huge_overflow() -> u64 {
    15000
}

fn default_aggressive_logistic_coef() -> f64 {
    1.33
}

fn default_history_decay() -> f32 {
    0.9
}

fn default_benchmark() -> String {
    "inputs/adaptec1.gr".to_string()
}

fn default_output_routes() -> String {
    "output/routes.txt".to_string()
}
