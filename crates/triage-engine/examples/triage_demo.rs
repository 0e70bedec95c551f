//! 分诊引擎演示程序
//!
//! 展示入院排队、资源分配、老化防饿死、取消和等待时间估计

use std::sync::Arc;
use std::time::Duration;
use triage_core::{format_wait, ManualClock, Specialty, TriageConfig, WaitEstimate};
use triage_engine::{FixedSignal, TriageEngine};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    let clock = Arc::new(ManualClock::default());
    let config = TriageConfig {
        aging_rate: 0.05,
        ..Default::default()
    };
    let engine = TriageEngine::with_clock(config, clock.clone())?;

    println!("🚀 分诊引擎演示\n");

    // 1. 注册资源
    let bed = engine.register_resource(Specialty::Cardiology).await;
    engine.register_resource(Specialty::Neurology).await;
    println!("✅ 资源注册完成");

    // 2. 病例入院
    let chest_pain = engine.admit(90.0, Specialty::Cardiology).await?;
    let palpitations = engine.admit(35.0, Specialty::Cardiology).await?;
    let seizure = engine.submit_case(82.0, "neurology").await?;
    let signal = FixedSignal::new(12.0, Specialty::Cardiology);
    let mild = engine.submit_with(&signal, &()).await?;
    println!("✅ 入院病例: {} {} {} {}", chest_pain, palpitations, seizure, mild);

    // 3. 显示等待列表
    clock.advance(Duration::from_secs(20 * 60));
    println!("\n📋 心内科等待列表:");
    for entry in engine.list_waiting(Specialty::Cardiology).await {
        let estimate = match entry.estimated_wait {
            WaitEstimate::Known(wait) => format_wait(wait),
            WaitEstimate::Unknown => "Unknown".to_string(),
        };
        println!(
            "   - {} 严重度 {:.0} 优先级 {:.1} [{}] 预计等待 {}",
            entry.case_id, entry.severity_score, entry.age_adjusted_priority, entry.level, estimate
        );
    }

    // 4. 释放资源，下一个病例自动分配
    engine.release(bed).await?;
    let next = engine.get_case(palpitations).await?;
    println!("\n🔄 资源 {} 释放后病例 {} 状态: {:?}", bed, palpitations, next.case.state);

    // 5. 取消等待中的病例
    engine.cancel(mild).await?;
    println!("✅ 病例 {} 已取消", mild);

    // 6. 护理安排
    let plan = engine.care_plan(seizure).await?;
    println!(
        "\n🏥 病例 {} 护理安排: {} / {} / {}",
        seizure,
        plan.room_type,
        plan.staff_level,
        plan.equipment.join(", ")
    );

    // 7. 系统概览
    let overview = engine.overview().await;
    println!("\n📊 系统概览:");
    println!("{}", serde_json::to_string_pretty(&overview)?);

    println!("\n🎉 分诊引擎演示完成!");
    Ok(())
}
