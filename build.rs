use vergen::EmitBuilder;

fn main() {
    // 构建时间与提交号，供 `magnetdown --version` 展示
    EmitBuilder::builder()
        .build_timestamp()
        .git_sha(true)
        .emit()
        .expect("Failed to generate build information");
}
