fn main() {
    tonic_build::configure()
        .build_server(false)
        .compile_protos(&["proto/dish_status.proto"], &["proto"])
        .expect("failed to compile dish_status.proto");
}
