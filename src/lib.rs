//! 视频主体裁剪帧采集：检测 → 多模型投票 → 选主体 → 构图裁剪 → 质量筛选

pub mod api;
pub mod core;

/// Install the logger once; later calls are no-ops. `RUST_LOG` overrides the
/// default `info` filter off Android.
pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("lora_harvester"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_millis()
            .try_init();
    }
}
