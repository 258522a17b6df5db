pub const MYSRV_CURR_CONN: &str = "mysrv_curr_connections";
pub const MYSRV_TOTAL_CONN: &str = "mysrv_total_connections";
pub const MYSRV_COM_LATENCY: &str = "mysrv_com_latency";

#[macro_export]
macro_rules! metrics_const {
    ($({$metric_name:ident, $init_fn:ident, $metric_type:expr, $name:expr, $desc:expr}),*) => {
        use metrics::KeyName;
        use std::sync::OnceLock;
        use $crate::metrics::MetricType;

        #[derive(Debug, Clone)]
        pub enum MetricsConsts {
           $($metric_name(&'static str, &'static str, KeyName, MetricType),)*
        }

        pub fn list_all_metrics() -> &'static Vec<MetricsConsts> {
           static ALL_METRICS: OnceLock<Vec<MetricsConsts>> = OnceLock::new();
           ALL_METRICS.get_or_init(|| {
              vec![$(MetricsConsts::$metric_name($name, $desc, KeyName::from_const_str($name), $metric_type),)*]
           })
        }

        impl MetricsConsts {
            $(
            #[inline]
            pub fn $init_fn() -> Self {
                MetricsConsts::$metric_name($name, $desc, KeyName::from_const_str($name), $metric_type)
            })*

            pub fn get_name(&self) -> String {
                let (name, _,_,_) = self.get_metrics_pair();
                name.to_string()
            }

            pub fn get_metrics_pair(&self) -> (&'static str, &'static str, &KeyName, &MetricType){
                match self {
                    $(
                    MetricsConsts::$metric_name(name, desc, key_name, metrics_type) => (name, desc, key_name, metrics_type),
                    )*
                }
            }
        }
    };
}

metrics_const!(
    { CurrentConnections, current_connections, MetricType::Gauge, MYSRV_CURR_CONN, "The number of connections currently served."},
    { TotalConnections, total_connections, MetricType::Counter, MYSRV_TOTAL_CONN, "The number of connections accepted since start."},
    { ComLatency, com_latency, MetricType::Histogram, MYSRV_COM_LATENCY, "Latency of command execution."}
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_all_metrics() {
        let names = list_all_metrics()
            .iter()
            .map(|m| m.get_name())
            .collect::<Vec<_>>();
        assert_eq!(names, vec![MYSRV_CURR_CONN, MYSRV_TOTAL_CONN, MYSRV_COM_LATENCY]);
        let com_latency = MetricsConsts::com_latency();
        let (_, _, _, metric_type) = com_latency.get_metrics_pair();
        assert!(matches!(metric_type, MetricType::Histogram));
    }
}
