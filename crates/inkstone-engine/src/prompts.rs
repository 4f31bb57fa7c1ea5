//! Prompt templates for the grading calls.
//!
//! The readable-format prompts pin the model to the exact layout the parsers
//! expect (`parse::whole_page`, `parse::single_char`). The JSON prompts are
//! only used by the multi-agent composer.

/// Whole-page grading prompt: one photograph, one call, readable template.
pub const WHOLE_PAGE_ANALYSIS: &str = "\
你是一位温和而专业的书法老师。请批改这张硬笔书法作业照片。

任务：
1. 识别页面上的所有汉字及其网格行列布局
2. 从结构（重心、间架、比例）和笔画（起笔、行笔、收笔）两方面给整页打分
3. 挑出写得最需要改进的 3~5 个字重点点评，并标明它们的行列位置
4. 用温和鼓励的语气写一段总评

请严格按照下面的格式输出（不要使用 JSON，不要使用 markdown 代码块）：

共识别 N 个汉字（R 行 C 列）：字1,字2,字3,...
结构：S 分 | 笔画：T 分 | 综合：O 分
【重点点评】
1.「字」（第R行第C列，综合 O 分）
结构（S 分）：一句结构点评
笔画（T 分）：一句笔画点评
建议：一句具体可操作的练习建议
2.「字」（第R行第C列，综合 O 分）
...
【总评】两三句话的整页总评，先肯定优点，再温柔指出改进方向。
";

/// Single-character deep critique prompt, readable template.
pub const SINGLE_CHAR_ANALYSIS: &str = "\
你是一位资深书法老师。请对这张图片中的单个手写汉字做深度精批。

评分维度：结构（间架比例）、笔画（起行收质量）、重心（稳定性）、间架（空间布局）。

请严格按照下面的格式输出（不要使用 JSON，不要使用 markdown 代码块）：

字：识别出的汉字
结构：a 分 | 笔画：b 分 | 重心：c 分 | 间架：d 分 | 综合：e 分
【结构分析】对间架结构的具体分析。
【笔画分析】对起笔行笔收笔的具体分析。
【重心分析】对重心稳定性的具体分析。
【间架分析】对空间布局的具体分析。
【总评】温和鼓励的综合评语，先肯定优点再指出方向。
【练习建议】一两条具体可操作的练习建议。
";

/// Multi-agent pass A: structure specialist (JSON reply).
pub const STRUCTURE_ANALYSIS: &str = "\
你是一位资深的书法结构分析专家。请仔细分析这个汉字的书写结构：
重心稳定性、间架结构、比例协调、空间分布。

请严格按照以下 JSON 格式返回（不要添加其他内容）：
{
  \"structureScore\": <0-100的整数>,
  \"structureComment\": \"<50字以内的结构分析>\"
}
";

/// Multi-agent pass B: stroke specialist (JSON reply).
pub const STROKE_ANALYSIS: &str = "\
你是一位资深的书法笔画分析专家。请仔细分析这个汉字的笔画质量：
起笔是否干净、行笔是否流畅、收笔是否稳定、笔锋是否有提按变化。

请严格按照以下 JSON 格式返回（不要添加其他内容）：
{
  \"strokeScore\": <0-100的整数>,
  \"strokeComment\": \"<50字以内的笔画分析>\"
}
";

/// Multi-agent pass C: compose the final comment from passes A and B.
pub fn comment_generator(structure_reply: &str, stroke_reply: &str) -> String {
    format!(
        "\
你是一位温和、鼓励式的书法老师。根据以下对一个汉字的分析结果，生成一段综合评语。

结构分析：{structure_reply}
笔画分析：{stroke_reply}

要求：先肯定做得好的地方，再温柔指出改进方向，并给出具体练习建议。

请严格按照以下 JSON 格式返回（不要添加其他内容）：
{{
  \"overallScore\": <0-100的整数>,
  \"overallComment\": \"<80字以内的综合评语>\",
  \"suggestion\": \"<50字以内的改进建议>\"
}}
"
    )
}
