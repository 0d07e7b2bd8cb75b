/// 负载均衡打分契约，仅在接口边界上约定语义。
///
/// # 设计背景（Why）
/// - 选路器需要一个同步、无并发契约的只读查询来比较候选资源的健康度；
/// - 该契约与广播原语互不依赖，放在本 crate 只为集中维护核心契约面。
///
/// # 契约说明（What）
/// - `score` 返回当前资源的评分，约定落在 `[0.0, 1.0]`：`0.0` 表示最不适合选择，
///   `1.0` 表示最适合；实现返回越界值或 `NaN` 时由 [`normalized_score`] 收敛；
/// - 查询应为无副作用操作，允许任意频率调用。
pub trait ScoreSource {
    /// 返回当前评分，期望值域 `[0.0, 1.0]`。
    fn score(&self) -> f32;
}

/// 读取评分并收敛到合法值域：越界值被钳制，`NaN` 按最差评分 `0.0` 处理。
pub fn normalized_score<S: ScoreSource + ?Sized>(source: &S) -> f32 {
    let raw = source.score();
    if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) }
}
