fn main() {
    cloud_playground::run();
}
